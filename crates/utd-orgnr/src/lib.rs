//! # utd-orgnr
//!
//! Organization-number control for education data.
//!
//! - [`registers`]: lookup of the school register and the vocational-school register
//! - [`kontroll`]: the `orgnr` → `orgnrbed` → school number matching cascade

pub mod kontroll;
pub mod registers;

pub use kontroll::{orgnrkontroll, orgnrkontroll_dataset, orgnrkontroll_with_registers, OrgnrOptions};
pub use registers::{
    skolereg, skolereg_pattern, vigo_pattern, vigo_skole, Year, SKOLEREG_KEY_COLS,
    SKOLEREG_SUBCATEGORIES, VIGO_KEY_COL,
};
