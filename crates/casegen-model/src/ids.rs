//! Typed identifiers
//!
//! Every persisted row is keyed by a 128-bit UUID wrapped in its own type
//! so a request id can never be passed where a test id is expected.

use std::fmt;

use uuid::Uuid;

macro_rules! id_type {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            serde::Serialize,
            serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generate a new random id
            #[inline]
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wrap an existing UUID
            #[inline]
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }
    };
}

id_type!(
    /// Identifier of one generation request
    RequestId
);
id_type!(
    /// Identifier of one generated test case
    TestCaseId
);
id_type!(
    /// Identifier of one stage execution metric
    MetricId
);
id_type!(
    /// Identifier of one coverage-analysis row
    CoverageId
);
id_type!(
    /// Identifier of one security audit log entry
    AuditId
);
id_type!(
    /// Identifier of one workflow checkpoint blob
    CheckpointId
);
