use serde::{Deserialize, Serialize};

pub mod modbus;

fn default_vendor_name() -> String {
    "mbcycle".to_owned()
}

fn default_product_code() -> String {
    "MC".to_owned()
}

fn default_product_name() -> String {
    "mbcycle Server".to_owned()
}

fn default_revision() -> String {
    env!("CARGO_PKG_VERSION").to_owned()
}

/// Device identification, descriptive only
#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Identity {
    #[serde(default = "default_vendor_name")]
    pub vendor_name: String,
    #[serde(default = "default_product_code")]
    pub product_code: String,
    #[serde(default)]
    pub vendor_url: String,
    #[serde(default = "default_product_name")]
    pub product_name: String,
    #[serde(default = "default_product_name")]
    pub model_name: String,
    #[serde(default = "default_revision")]
    pub major_minor_revision: String,
}

impl Default for Identity {
    fn default() -> Self {
        Self {
            vendor_name: default_vendor_name(),
            product_code: default_product_code(),
            vendor_url: String::new(),
            product_name: default_product_name(),
            model_name: default_product_name(),
            major_minor_revision: default_revision(),
        }
    }
}
