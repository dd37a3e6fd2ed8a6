//! Domain types for medication dispensing.
//!
//! Entities mirror the relational model: a [`Prescription`] owns its
//! [`PrescriptionItem`]s, a [`Dispense`] belongs to one prescription and owns
//! its [`DispenseLine`]s, and every line points back at one prescription item.
//! Stock lives on [`Medicine`].
//!
//! All quantities are [`Decimal`] so that fractional units (millilitres,
//! half tablets) never go through floating point.

use crate::store::StoreError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random identifier
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wraps an existing UUID
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Get the inner UUID
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for a medicine in the inventory
    MedicineId
);
uuid_id!(
    /// Unique identifier for a prescription
    PrescriptionId
);
uuid_id!(
    /// Unique identifier for a prescription item
    PrescriptionItemId
);
uuid_id!(
    /// Unique identifier for a dispense
    DispenseId
);
uuid_id!(
    /// Unique identifier for a dispense line
    DispenseLineId
);
uuid_id!(
    /// Reference to an encounter (appointment) owned by the upstream service
    EncounterId
);
uuid_id!(
    /// Identifier of the person performing an action (pharmacist, doctor)
    ActorId
);

// ============================================================================
// Statuses
// ============================================================================

/// Lifecycle of a prescription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PrescriptionStatus {
    /// Freshly written, nothing dispensed yet
    Created,
    /// Edited after creation, nothing dispensed yet
    Updated,
    /// At least one item has completed quantity, not all items are satisfied
    PartiallyDispensed,
    /// Every item has been dispensed in full
    Dispensed,
    /// Withdrawn; terminal
    Canceled,
}

impl PrescriptionStatus {
    /// Convert status to database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::Updated => "UPDATED",
            Self::PartiallyDispensed => "PARTIALLY_DISPENSED",
            Self::Dispensed => "DISPENSED",
            Self::Canceled => "CANCELED",
        }
    }

    /// Parse status from database string.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::CorruptRecord`] if the string doesn't match a known status.
    pub fn parse(s: &str) -> Result<Self, StoreError> {
        match s {
            "CREATED" => Ok(Self::Created),
            "UPDATED" => Ok(Self::Updated),
            "PARTIALLY_DISPENSED" => Ok(Self::PartiallyDispensed),
            "DISPENSED" => Ok(Self::Dispensed),
            "CANCELED" => Ok(Self::Canceled),
            _ => Err(StoreError::CorruptRecord(format!(
                "Invalid prescription status: {s}"
            ))),
        }
    }

    /// Whether a new dispense may be opened against a prescription in this status.
    #[must_use]
    pub const fn accepts_dispense(&self) -> bool {
        !matches!(self, Self::Dispensed | Self::Canceled)
    }

    /// Whether items may still be added or removed.
    #[must_use]
    pub const fn allows_item_changes(&self) -> bool {
        !matches!(self, Self::Dispensed | Self::Canceled)
    }
}

impl fmt::Display for PrescriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a dispense. COMPLETED is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DispenseStatus {
    /// Open for new lines
    Pending,
    /// Stock decremented, lines frozen
    Completed,
}

impl DispenseStatus {
    /// Convert status to database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Completed => "COMPLETED",
        }
    }

    /// Parse status from database string.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::CorruptRecord`] if the string doesn't match a known status.
    pub fn parse(s: &str) -> Result<Self, StoreError> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "COMPLETED" => Ok(Self::Completed),
            _ => Err(StoreError::CorruptRecord(format!(
                "Invalid dispense status: {s}"
            ))),
        }
    }
}

impl fmt::Display for DispenseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Entities
// ============================================================================

/// A stocked medicine.
///
/// `stock` is never negative; only the inventory ledger changes it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Medicine {
    /// Medicine ID
    pub id: MedicineId,
    /// Display name
    pub name: String,
    /// Active ingredient
    pub generic_name: Option<String>,
    /// Dosage form (tablet, syrup, ...)
    pub form: Option<String>,
    /// Strength (e.g. "500 mg")
    pub strength: Option<String>,
    /// Stock keeping unit
    pub unit: Option<String>,
    /// Quantity on hand
    pub stock: Decimal,
    /// Whether the medicine is still carried
    pub is_active: bool,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

/// A prescription written during an encounter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prescription {
    /// Prescription ID
    pub id: PrescriptionId,
    /// Encounter (appointment) the prescription was written in
    pub encounter_id: EncounterId,
    /// Current status
    pub status: PrescriptionStatus,
    /// Start of validity
    pub valid_from: DateTime<Utc>,
    /// End of validity
    pub valid_to: Option<DateTime<Utc>>,
    /// Free-text notes
    pub notes: Option<String>,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
    /// Who created it
    pub created_by: Option<ActorId>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
    /// Who last updated it
    pub updated_by: Option<ActorId>,
    /// When it was canceled
    pub canceled_at: Option<DateTime<Utc>>,
    /// Who canceled it
    pub canceled_by: Option<ActorId>,
    /// Why it was canceled
    pub canceled_reason: Option<String>,
}

/// One prescribed medicine with its quantity and dosing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrescriptionItem {
    /// Item ID
    pub id: PrescriptionItemId,
    /// Owning prescription
    pub prescription_id: PrescriptionId,
    /// Prescribed medicine
    pub medicine_id: MedicineId,
    /// Upper bound on the total completed dispensed quantity
    pub quantity_prescribed: Decimal,
    /// Unit the quantity is expressed in
    pub unit_prescribed: Option<String>,
    /// Dose per intake
    pub dose: Option<String>,
    /// Intake frequency
    pub frequency: Option<String>,
    /// Treatment duration
    pub duration: Option<String>,
    /// Free-text notes
    pub notes: Option<String>,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

/// A single act of handing out medication against a prescription.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dispense {
    /// Dispense ID
    pub id: DispenseId,
    /// Prescription being dispensed
    pub prescription_id: PrescriptionId,
    /// Current status
    pub status: DispenseStatus,
    /// When the dispense was completed
    pub dispensed_at: Option<DateTime<Utc>>,
    /// Who completed it
    pub dispensed_by: Option<ActorId>,
    /// Free-text notes
    pub notes: Option<String>,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
    /// Who opened it
    pub created_by: Option<ActorId>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Dispense {
    /// Open a new PENDING dispense.
    #[must_use]
    pub fn pending(
        prescription_id: PrescriptionId,
        notes: Option<String>,
        created_by: Option<ActorId>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: DispenseId::new(),
            prescription_id,
            status: DispenseStatus::Pending,
            dispensed_at: None,
            dispensed_by: None,
            notes,
            created_at: now,
            created_by,
            updated_at: now,
        }
    }

    /// Whether lines may still be appended.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.status == DispenseStatus::Pending
    }
}

/// One medicine-quantity entry within a dispense. Immutable once stored.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispenseLine {
    /// Line ID
    pub id: DispenseLineId,
    /// Owning dispense
    pub dispense_id: DispenseId,
    /// Prescription item being dispensed
    pub prescription_item_id: PrescriptionItemId,
    /// Quantity handed out, strictly positive
    pub quantity_dispensed: Decimal,
    /// Free-text notes
    pub notes: Option<String>,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
}

/// Dispense together with its current lines, the representation every
/// dispense operation returns.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispenseWithLines {
    /// The dispense
    #[serde(flatten)]
    pub dispense: Dispense,
    /// Lines in insertion order
    pub lines: Vec<DispenseLine>,
}

/// Prescription together with its items.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrescriptionWithItems {
    /// The prescription
    #[serde(flatten)]
    pub prescription: Prescription,
    /// Items in insertion order
    pub items: Vec<PrescriptionItem>,
}

/// Input for one item of a new prescription.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPrescriptionItem {
    /// Prescribed medicine
    pub medicine_id: MedicineId,
    /// Prescribed quantity
    pub quantity_prescribed: Decimal,
    /// Unit the quantity is expressed in
    #[serde(default)]
    pub unit_prescribed: Option<String>,
    /// Dose per intake
    #[serde(default)]
    pub dose: Option<String>,
    /// Intake frequency
    #[serde(default)]
    pub frequency: Option<String>,
    /// Treatment duration
    #[serde(default)]
    pub duration: Option<String>,
    /// Free-text notes
    #[serde(default)]
    pub notes: Option<String>,
}

impl NewPrescriptionItem {
    /// Item with only the required fields set.
    #[must_use]
    pub const fn new(medicine_id: MedicineId, quantity_prescribed: Decimal) -> Self {
        Self {
            medicine_id,
            quantity_prescribed,
            unit_prescribed: None,
            dose: None,
            frequency: None,
            duration: None,
            notes: None,
        }
    }

    /// Materialize the item under a prescription.
    #[must_use]
    pub fn into_item(self, prescription_id: PrescriptionId, now: DateTime<Utc>) -> PrescriptionItem {
        PrescriptionItem {
            id: PrescriptionItemId::new(),
            prescription_id,
            medicine_id: self.medicine_id,
            quantity_prescribed: self.quantity_prescribed,
            unit_prescribed: self.unit_prescribed,
            dose: self.dose,
            frequency: self.frequency,
            duration: self.duration,
            notes: self.notes,
            created_at: now,
            updated_at: now,
        }
    }
}
