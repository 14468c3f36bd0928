use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};
use validator::Validate;

use super::fields::RawFields;

/// Column names used by the failure classifiers
pub mod columns {
    pub const AIR_TEMPERATURE: &str = "Air temperature [K]";
    pub const PROCESS_TEMPERATURE: &str = "Process temperature [K]";
    pub const ROTATIONAL_SPEED: &str = "Rotational speed [rpm]";
    pub const TORQUE: &str = "Torque [Nm]";
    pub const TOOL_WEAR: &str = "Tool wear [min]";
    pub const TYPE_L: &str = "Type_L";
    pub const TYPE_M: &str = "Type_M";
    pub const TYPE_H: &str = "Type_H";
}

/// Product quality variant
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display, EnumIter,
)]
pub enum ProductType {
    /// Low quality
    L,
    /// Medium quality
    M,
    /// High quality
    H,
}

impl ProductType {
    /// Name of the one-hot column for this variant
    pub fn one_hot_column(&self) -> &'static str {
        match self {
            ProductType::L => columns::TYPE_L,
            ProductType::M => columns::TYPE_M,
            ProductType::H => columns::TYPE_H,
        }
    }
}

/// Operating parameters of a machine at a point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct SensorReading {
    /// Air temperature in Kelvin
    #[validate(range(min = 250.0, max = 400.0))]
    pub air_temperature_k: f64,

    /// Process temperature in Kelvin
    #[validate(range(min = 250.0, max = 400.0))]
    pub process_temperature_k: f64,

    /// Rotational speed in rpm
    #[validate(range(min = 0.0, max = 5000.0))]
    pub rotational_speed_rpm: f64,

    /// Torque in Nm
    #[validate(range(min = 0.0, max = 100.0))]
    pub torque_nm: f64,

    /// Tool wear in minutes
    #[validate(range(min = 0.0, max = 300.0))]
    pub tool_wear_min: f64,

    /// Product type
    pub product_type: ProductType,
}

impl Default for SensorReading {
    fn default() -> Self {
        Self {
            air_temperature_k: 300.0,
            process_temperature_k: 310.0,
            rotational_speed_rpm: 1500.0,
            torque_nm: 40.0,
            tool_wear_min: 50.0,
            product_type: ProductType::M,
        }
    }
}

impl SensorReading {
    /// Expand into named raw fields, one-hot encoding the product type.
    ///
    /// Every variant gets a flag column; the reconciler drops whichever
    /// flags the model schema does not name.
    pub fn to_raw_fields(&self) -> RawFields {
        let mut fields = RawFields::new()
            .with(columns::AIR_TEMPERATURE, self.air_temperature_k)
            .with(columns::PROCESS_TEMPERATURE, self.process_temperature_k)
            .with(columns::ROTATIONAL_SPEED, self.rotational_speed_rpm)
            .with(columns::TORQUE, self.torque_nm)
            .with(columns::TOOL_WEAR, self.tool_wear_min);

        for variant in ProductType::iter() {
            let flag = if variant == self.product_type { 1.0 } else { 0.0 };
            fields.insert(variant.one_hot_column(), flag);
        }

        fields
    }
}
