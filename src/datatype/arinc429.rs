//! ARINC-429 data, format 0.
use std::sync::Arc;

use super::{BodyKind, Schema};
use crate::format::BitFieldFormat;

/// IRIG-106 data type code
pub const DATA_TYPE: u8 = 0x38;
pub const ITEM_LABEL: &str = "ARINC-429 Data Word";
pub const ITEM_SIZE: usize = 4;

#[must_use]
pub fn schema() -> Schema {
    let csdw =
        BitFieldFormat::compile("u16 count p16").expect("ARINC-429 CSDW format is not valid");
    let iph = BitFieldFormat::compile(
        "
        u20 gap_time
        p1
        u1 bus_speed
        u1 parity_error
        u1 format_error
        u8 bus",
    )
    .expect("ARINC-429 IPH format is not valid");

    Schema {
        name: "ARINC-429 Format 0".to_string(),
        csdw_format: Some(csdw),
        body: BodyKind::Items {
            iph_format: Arc::new(iph),
            label: ITEM_LABEL.to_string(),
            item_size: Some(ITEM_SIZE),
        },
    }
}
