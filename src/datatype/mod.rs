//! Payload schemas keyed by the header `data_type` code.
//!
//! Adding a channel type means adding a [Schema] to a [Registry]; the packet and item
//! decoding code is shared by all of them.
pub mod arinc429;
pub mod message;

use std::collections::HashMap;
use std::sync::Arc;

use crate::format::BitFieldFormat;

/// How the bytes following the CSDW are laid out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyKind {
    /// A single body, optionally led by a fixed set of fields.
    Flat {
        data_format: Option<BitFieldFormat>,
    },
    /// A sequence of items, each preceded by an intra-packet header (IPH).
    Items {
        iph_format: Arc<BitFieldFormat>,
        label: String,
        /// Fixed payload size of every item. When `None` the payload size is taken from the
        /// IPH `length` field, or 0 if the IPH has none.
        item_size: Option<usize>,
    },
}

/// Decoding rules for one data type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    pub name: String,
    /// Channel specific data word format. `None` means the body has no CSDW.
    pub csdw_format: Option<BitFieldFormat>,
    pub body: BodyKind,
}

impl Schema {
    /// Schema used for data types with no registered schema: no CSDW and a raw body.
    #[must_use]
    pub fn generic() -> Self {
        Schema {
            name: "Unknown".to_string(),
            csdw_format: None,
            body: BodyKind::Flat { data_format: None },
        }
    }

    /// Size of the CSDW in bytes.
    #[must_use]
    pub fn csdw_len(&self) -> usize {
        self.csdw_format
            .as_ref()
            .map_or(0, BitFieldFormat::size_bytes)
    }
}

/// Maps data type codes to [Schema]s.
///
/// Lookups never fail; unregistered codes resolve to [Schema::generic].
///
/// # Example
/// ```
/// use chapter10::Registry;
///
/// let registry = Registry::default();
/// assert_eq!(registry.lookup(0x38).name, "ARINC-429 Format 0");
/// assert_eq!(registry.lookup(0x7f).name, "Unknown");
/// ```
#[derive(Debug, Clone)]
pub struct Registry {
    schemas: HashMap<u8, Arc<Schema>>,
    generic: Arc<Schema>,
}

impl Registry {
    /// A registry with no schemas; every data type decodes generically.
    #[must_use]
    pub fn empty() -> Self {
        Registry {
            schemas: HashMap::new(),
            generic: Arc::new(Schema::generic()),
        }
    }

    /// Register `schema` for `data_type`, replacing any existing schema.
    pub fn register(&mut self, data_type: u8, schema: Schema) {
        self.schemas.insert(data_type, Arc::new(schema));
    }

    #[must_use]
    pub fn lookup(&self, data_type: u8) -> Arc<Schema> {
        self.schemas
            .get(&data_type)
            .unwrap_or(&self.generic)
            .clone()
    }

    #[must_use]
    pub fn contains(&self, data_type: u8) -> bool {
        self.schemas.contains_key(&data_type)
    }
}

impl Default for Registry {
    /// Registry with the built-in schemas. ARINC-429 is available under both `0x00` and
    /// its IRIG-106 code.
    fn default() -> Self {
        let mut registry = Registry::empty();
        let arinc = arinc429::schema();
        registry.register(0x00, arinc.clone());
        registry.register(arinc429::DATA_TYPE, arinc);
        registry.register(message::DATA_TYPE, message::schema());
        registry
    }
}
