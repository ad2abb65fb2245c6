//! S3 operation handlers.
//!
//! Each submodule adds `handle_*` methods to [`crate::provider::ShoeboxS3`].
//! Handlers take plain inputs already extracted from the HTTP request and
//! return the XML document types from `shoebox-model`, or small output
//! structs for operations answered with headers and a body.
//!
//! The server binary bridges these handlers to the HTTP layer by implementing
//! the `S3Handler` trait from `shoebox-http`.

pub mod bucket;
pub mod list;
pub mod multipart;
pub mod object;

use shoebox_model::types::{AccessControlPolicy, ALL_USERS_GROUP, Grant, Grantee, Owner};

/// Canned ACLs that grant anonymous read access.
pub(crate) fn is_public_canned_acl(acl: &str) -> bool {
    matches!(acl, "public-read" | "public-read-write")
}

/// Owner with `FULL_CONTROL`, plus `READ` for everyone when public.
pub(crate) fn build_acl(owner: Owner, public: bool) -> AccessControlPolicy {
    let mut grants = vec![Grant {
        grantee: Grantee::CanonicalUser(owner.clone()),
        permission: "FULL_CONTROL".to_owned(),
    }];
    if public {
        grants.push(Grant {
            grantee: Grantee::Group {
                uri: ALL_USERS_GROUP.to_owned(),
            },
            permission: "READ".to_owned(),
        });
    }
    AccessControlPolicy { owner, grants }
}
