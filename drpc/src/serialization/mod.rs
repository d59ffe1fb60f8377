//
// Copyright 2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Pluggable object serialization for message bodies.
//!
//! A [`Serialization`] turns a body buffer into an [`ObjectOutput`] or
//! [`ObjectInput`] stream. The codec writes the objects of a request or
//! response one after another and reads them back in the same order; the
//! frame header carries the serialization's content type id so the peer
//! can pick the matching reader.
//!
//! Built-in formats:
//!
//! - [`JsonSerialization`] (`json`, id 2, default): newline delimited JSON
//! - [`PostcardSerialization`] (`postcard`, id 12): compact binary, behind
//!   the default `postcard` feature

mod error;
mod json;
#[cfg(feature = "postcard")]
mod postcard;
mod traits;

pub use error::{DeserializationError, SerializationError};
pub use json::{JsonSerialization, JSON_SERIALIZATION_ID};
#[cfg(feature = "postcard")]
pub use self::postcard::{PostcardSerialization, POSTCARD_SERIALIZATION_ID};
pub use traits::{ObjectInput, ObjectOutput, Serialization};

use crate::extension::ExtensionLoader;
use std::sync::Arc;

/// Finds the serialization whose content type id is `id`.
///
/// # Errors
///
/// Fails when no declared serialization uses `id`.
pub fn find_by_id(
    loader: &ExtensionLoader<dyn Serialization>,
    id: u8,
) -> Result<Arc<dyn Serialization>, DeserializationError> {
    let names = loader
        .supported_extensions()
        .map_err(|err| DeserializationError::with_source("serialization lookup failed", err))?;
    for name in names {
        let serialization = loader
            .get_extension(&name)
            .map_err(|err| DeserializationError::with_source("serialization lookup failed", err))?;
        if serialization.content_type_id() == id {
            return Ok(serialization);
        }
    }
    Err(DeserializationError::new(format!(
        "unrecognized serialization type id {id}"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extension::ExtensionRegistry;

    #[test]
    fn test_find_by_id() {
        let registry = ExtensionRegistry::new();
        let loader = registry.loader::<dyn Serialization>();
        assert_eq!(find_by_id(&loader, JSON_SERIALIZATION_ID).unwrap().content_type(), "text/json");
        assert!(find_by_id(&loader, 31).is_err());
    }
}
