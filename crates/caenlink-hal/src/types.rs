//! Common types exchanged through the HAL surface.
//!
//! This module defines the generic shapes a reader controller reports:
//! observations, tag and memory descriptors, and the inventory records they
//! are built from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Transponder code reported for EPC Class 1 Gen 2 tags.
pub const EPC_CLASS1_GEN2_CODE: u8 = 0x84;

/// Transponder (tag) type of an inventory record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum TransponderType {
    /// EPC Class 1 Generation 2 (ISO 18000-6C).
    EpcClass1Gen2,

    /// Any other transponder, by raw code.
    Other(u8),
}

impl TransponderType {
    /// Map a raw transponder code to its type.
    ///
    /// # Examples
    ///
    /// ```
    /// use caenlink_hal::types::TransponderType;
    ///
    /// assert_eq!(TransponderType::from_code(0x84), TransponderType::EpcClass1Gen2);
    /// assert_eq!(TransponderType::from_code(0x01), TransponderType::Other(0x01));
    /// ```
    pub fn from_code(code: u8) -> Self {
        match code {
            EPC_CLASS1_GEN2_CODE => Self::EpcClass1Gen2,
            other => Self::Other(other),
        }
    }

    /// Get the raw transponder code.
    pub fn code(&self) -> u8 {
        match self {
            Self::EpcClass1Gen2 => EPC_CLASS1_GEN2_CODE,
            Self::Other(code) => *code,
        }
    }
}

/// Identifier type attached to a tag descriptor (e.g. "EPC").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdType {
    /// Identifier type name.
    pub name: String,
}

impl IdType {
    /// Create a new identifier type.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Size and access rights of one memory bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryBankDescriptor {
    /// Bank size in bytes.
    pub size: usize,

    /// Bank can be read.
    pub readable: bool,

    /// Bank can be written.
    pub writeable: bool,
}

impl MemoryBankDescriptor {
    /// Create a new memory bank descriptor.
    pub fn new(size: usize, readable: bool, writeable: bool) -> Self {
        Self {
            size,
            readable,
            writeable,
        }
    }
}

/// Memory layout of a tag, one descriptor per bank.
///
/// For EPC Class 1 Gen 2 tags the banks are, in order: reserved, EPC, TID,
/// user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryDescriptor {
    /// Memory banks in bank-number order.
    pub banks: Vec<MemoryBankDescriptor>,
}

impl MemoryDescriptor {
    /// Create a memory descriptor from its banks.
    pub fn new(banks: Vec<MemoryBankDescriptor>) -> Self {
        Self { banks }
    }

    /// Get the descriptor of bank `index`, if present.
    pub fn bank(&self, index: usize) -> Option<&MemoryBankDescriptor> {
        self.banks.get(index)
    }
}

/// Identifier type and memory layout of an observed tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagDescriptor {
    /// Identifier type.
    pub id_type: IdType,

    /// Memory layout.
    pub memory: MemoryDescriptor,
}

impl TagDescriptor {
    /// Create a new tag descriptor.
    pub fn new(id_type: IdType, memory: MemoryDescriptor) -> Self {
        Self { id_type, memory }
    }
}

/// Memory model of an EPC Class 1 Gen 2 transponder.
///
/// Sizes are in bytes. Loaded from the `epc_transponder_model` section of the
/// reader configuration; unset fields fall back to a common Gen 2 layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EpcTransponderModel {
    pub reserved_size: usize,
    pub reserved_readable: bool,
    pub reserved_writeable: bool,
    pub epc_size: usize,
    pub epc_readable: bool,
    pub epc_writeable: bool,
    pub tid_size: usize,
    pub tid_readable: bool,
    pub tid_writeable: bool,
    pub user_size: usize,
    pub user_readable: bool,
    pub user_writeable: bool,
}

impl Default for EpcTransponderModel {
    fn default() -> Self {
        Self {
            reserved_size: 8,
            reserved_readable: false,
            reserved_writeable: false,
            epc_size: 16,
            epc_readable: true,
            epc_writeable: true,
            tid_size: 12,
            tid_readable: true,
            tid_writeable: false,
            user_size: 64,
            user_readable: true,
            user_writeable: true,
        }
    }
}

impl EpcTransponderModel {
    /// Build the four-bank memory descriptor of this model.
    ///
    /// # Examples
    ///
    /// ```
    /// use caenlink_hal::types::EpcTransponderModel;
    ///
    /// let memory = EpcTransponderModel::default().memory_descriptor();
    /// assert_eq!(memory.banks.len(), 4);
    /// assert_eq!(memory.bank(1).unwrap().size, 16);
    /// ```
    pub fn memory_descriptor(&self) -> MemoryDescriptor {
        MemoryDescriptor::new(vec![
            MemoryBankDescriptor::new(
                self.reserved_size,
                self.reserved_readable,
                self.reserved_writeable,
            ),
            MemoryBankDescriptor::new(self.epc_size, self.epc_readable, self.epc_writeable),
            MemoryBankDescriptor::new(self.tid_size, self.tid_readable, self.tid_writeable),
            MemoryBankDescriptor::new(self.user_size, self.user_readable, self.user_writeable),
        ])
    }
}

/// One tag seen by the reader, before translation into an observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryItem {
    /// Tag identifier as reported by the reader.
    pub id: String,

    /// Transponder type.
    pub transponder_type: TransponderType,

    /// Tag TID, when known.
    pub tid: Vec<u8>,

    /// Read point the tag was seen on.
    pub read_point: String,

    /// Memory model used to describe the tag.
    pub model: EpcTransponderModel,
}

impl InventoryItem {
    /// Build the tag descriptor of this item.
    ///
    /// Only EPC Class 1 Gen 2 items have a descriptor.
    pub fn tag_descriptor(&self, id_type: &IdType) -> Option<TagDescriptor> {
        match self.transponder_type {
            TransponderType::EpcClass1Gen2 => Some(TagDescriptor::new(
                id_type.clone(),
                self.model.memory_descriptor(),
            )),
            _ => None,
        }
    }
}

/// Result of one identify cycle on one read point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    /// Name of the controller that made the observation.
    pub hal_name: String,

    /// Read point the tags were seen on.
    pub read_point_name: String,

    /// Tag identifiers, in first-seen order.
    pub ids: Vec<String>,

    /// Tag descriptors, index-aligned with `ids`. Present only when every
    /// tag could be described.
    pub tag_descriptors: Option<Vec<TagDescriptor>>,

    /// Time the observation was made.
    pub timestamp: DateTime<Utc>,
}

impl Observation {
    /// Create an empty observation stamped with the current time.
    pub fn new(hal_name: impl Into<String>, read_point_name: impl Into<String>) -> Self {
        Self {
            hal_name: hal_name.into(),
            read_point_name: read_point_name.into(),
            ids: Vec::new(),
            tag_descriptors: None,
            timestamp: Utc::now(),
        }
    }

    /// Fill the observation from inventory items.
    ///
    /// Descriptors are attached only when every item yields one.
    pub fn with_items(mut self, items: &[InventoryItem], id_type: &IdType) -> Self {
        let descriptors: Vec<TagDescriptor> = items
            .iter()
            .filter_map(|item| item.tag_descriptor(id_type))
            .collect();

        self.ids = items.iter().map(|item| item.id.clone()).collect();
        self.tag_descriptors = (descriptors.len() == items.len()).then_some(descriptors);
        self
    }
}

/// Trigger condition for asynchronous identification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trigger {
    /// Trigger kind (e.g. "timer", "io").
    pub kind: String,

    /// Kind-specific trigger value.
    pub value: String,
}

impl Trigger {
    /// Create a new trigger.
    pub fn new(kind: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            value: value.into(),
        }
    }
}
