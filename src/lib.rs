pub mod binary;
pub mod codec;
pub mod block;
pub mod crypto;
pub mod recovery;
pub mod record;
pub mod page;
pub mod header;
pub mod file;
pub mod values;

pub use binary::RandomAccess;
pub use block::Block;
pub use crypto::{Key, KeyError};
pub use recovery::{KeyRecoveryEngine, KnownBlock, PartialKey};
pub use record::{RecordDecoder, RecordHeader, TpsRecord, TpsRecordDecoder};
pub use page::{Page, PageError};
pub use header::FileHeader;
pub use file::{FileError, TpsFile};
pub use values::{FieldType, Row, TpsValue};
