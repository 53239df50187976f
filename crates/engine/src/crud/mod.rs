//! Typed record access over a [`Transaction`](crate::Transaction)
//!
//! - [`Reader`]: point reads and bucket scans, decoding into a [`Record`] type
//! - [`Upserter`]: encodes and stages records, optionally with edges
//! - [`Deleter`]: removes records, optionally cascading to children that
//!   nothing else references
//!
//! Every write marks the record key dirty so the commit queues it for
//! indexing.
//!
//! [`Record`]: dackbox_core::Record

mod deleter;
mod reader;
mod upserter;

pub use deleter::{collect_cascade, Deleter, GcPolicy};
pub use reader::Reader;
pub use upserter::{KeyFn, Upserter};

#[cfg(test)]
pub(crate) mod fixtures {
    use std::sync::Arc;

    use serde::{Deserialize, Serialize};

    use dackbox_core::{BucketRegistry, Record};
    use dackbox_storage::RecordStore;

    use crate::{DackBox, DackBoxConfig};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Component {
        pub id: String,
        pub version: String,
    }

    impl Component {
        pub fn new(id: &str, version: &str) -> Self {
            Self {
                id: id.to_string(),
                version: version.to_string(),
            }
        }
    }

    impl Record for Component {
        fn id(&self) -> &str {
            &self.id
        }
    }

    pub fn dackbox() -> DackBox {
        let buckets = BucketRegistry::new()
            .with_bucket(b"image", "images")
            .unwrap()
            .with_bucket(b"component", "components")
            .unwrap()
            .with_bucket(b"cve", "cves")
            .unwrap();
        DackBox::open(
            Arc::new(RecordStore::ephemeral()),
            DackBoxConfig::default(),
            buckets,
        )
        .unwrap()
    }
}
