mod common;

use std::fs::File;

use tempfile::NamedTempFile;
use topspeed::block::{Block, BLOCK_SIZE};
use topspeed::file::TpsFile;
use topspeed::recovery::{
    read_candidates, verify, write_candidates, CandidateRange, KeyRecoveryEngine, KnownBlock, ScanMode,
};

fn window() -> CandidateRange {
    let base = common::WINDOW_BASE as u32 as u64;
    CandidateRange::new(base, base + 0x1000).unwrap()
}

/// The first `n` blocks of an encrypted file paired with their plaintext.
fn known_from_file(plain: &[u8], encrypted: &[u8], n: usize) -> Vec<KnownBlock> {
    (0..n)
        .map(|i| {
            let at = i * BLOCK_SIZE;
            KnownBlock::new(
                Block::from_bytes(&encrypted[at..at + BLOCK_SIZE]).unwrap(),
                Block::from_bytes(&plain[at..at + BLOCK_SIZE]).unwrap(),
            )
        })
        .collect()
}

#[test]
fn test_recover_key_and_decrypt_file() {
    let key = common::window_key();
    let plain = common::sample_file(8);
    let encrypted = common::encrypt(&key, &plain);

    let known = known_from_file(&plain, &encrypted, 2);
    let mut engine = KeyRecoveryEngine::new(known.clone()).unwrap().with_range(window());
    let keys = engine.recover().unwrap();

    assert!(keys.contains(&key));
    for k in &keys {
        assert!(verify(k, &known));
    }

    let mut file = TpsFile::from_encrypted_bytes(encrypted, &keys[0]).unwrap();
    assert_eq!(file.records().unwrap().len(), 9);
}

#[test]
fn test_saved_candidates_resume() {
    let key = common::window_key();
    let plain = common::sample_file(4);
    let encrypted = common::encrypt(&key, &plain);
    let known = known_from_file(&plain, &encrypted, 2);

    let mut first = KeyRecoveryEngine::new(known.clone()).unwrap().with_range(window());
    for index in (10..16).rev() {
        assert!(first.scan_index(index, ScanMode::Cross).unwrap() > 0);
    }

    let temp = NamedTempFile::new().unwrap();
    write_candidates(File::create(temp.path()).unwrap(), first.candidates()).unwrap();
    let saved = read_candidates(File::open(temp.path()).unwrap()).unwrap();
    assert_eq!(saved.len(), first.candidate_count());
    assert!(saved.iter().all(|k| k.invalid_indexes() == (0..10).collect::<Vec<_>>()));

    let mut resumed = KeyRecoveryEngine::resume(known, &saved).unwrap().with_range(window());
    assert!(resumed.recover().unwrap().contains(&key));
}

#[test]
fn test_wrong_window_finds_nothing() {
    let key = common::window_key();
    let plain = common::sample_file(2);
    let encrypted = common::encrypt(&key, &plain);

    let elsewhere = CandidateRange::new(0x1000, 0x2000).unwrap();
    let mut engine = KeyRecoveryEngine::new(known_from_file(&plain, &encrypted, 1))
        .unwrap()
        .with_range(elsewhere);
    assert!(engine.recover().unwrap().is_empty());
    assert!(!engine.is_complete());
}
