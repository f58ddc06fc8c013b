//! Newtypes for remote resource identifiers to avoid bare integers.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! remote_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            /// Wraps a raw identifier returned by the server.
            #[must_use]
            pub const fn new(value: u64) -> Self {
                Self(value)
            }

            /// Returns the raw identifier.
            #[must_use]
            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

remote_id!(
    /// Identifier of an inventory record.
    InventoryId
);
remote_id!(
    /// Identifier of a host record.
    HostId
);
remote_id!(
    /// Identifier of a credential record.
    CredentialId
);
remote_id!(
    /// Identifier of a credential type (for example `Machine`).
    CredentialTypeId
);
remote_id!(
    /// Identifier of an organisation owning created records.
    OrganizationId
);
remote_id!(
    /// Identifier of a job template or workflow job template.
    TemplateId
);
remote_id!(
    /// Identifier of a launched job or workflow job.
    JobId
);
