#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `cas_digest` describes how blobs in the Content Addressable Storage are
//! identified. A [`Digest`] is a lowercase hexadecimal hash plus the size of
//! the blob, tagged with the [`Function`] that produced it. A [`Function`]
//! pairs a hashing algorithm ([`DigestFunction`]) with an [`InstanceName`], so
//! two digests with identical hashes but different instance names are
//! distinct.
//!
//! # Design
//!
//! - [`InstanceName`] validates the `/`-separated namespace supplied by
//!   clients and rejects reserved keywords.
//! - [`DigestFunction`] enumerates the supported hashing algorithms and
//!   computes hashes through the RustCrypto [`digest`] traits.
//! - [`Function::new_digest_from_proto`] converts the wire representation
//!   ([`DigestProto`]) into a validated [`Digest`].
//! - [`DigestSet`] is an ordered, duplicate-free collection used for digest
//!   closures and `FindMissing` batches.
//!
//! # Examples
//!
//! ```
//! use cas_digest::InstanceName;
//!
//! let instance = InstanceName::new("main").unwrap();
//! let function = instance.digest_function("SHA256").unwrap();
//! let digest = function.compute(b"Hello");
//! assert_eq!(digest.size_bytes(), 5);
//! assert!(digest.uses_digest_function(&function));
//! ```

mod digest_value;
mod error;
mod function;
mod instance_name;
mod set;

pub use crate::digest_value::{Digest, DigestProto};
pub use crate::error::DigestError;
pub use crate::function::{DigestFunction, Function};
pub use crate::instance_name::InstanceName;
pub use crate::set::{DigestSet, DigestSetBuilder};
