//! Generic message data, format 0.
use std::sync::Arc;

use super::{BodyKind, Schema};
use crate::format::BitFieldFormat;

/// IRIG-106 data type code
pub const DATA_TYPE: u8 = 0x30;
pub const ITEM_LABEL: &str = "Message Data";

#[must_use]
pub fn schema() -> Schema {
    let csdw = BitFieldFormat::compile("u16 count u2 packet_type p14")
        .expect("message CSDW format is not valid");
    // Item length is carried by the IPH
    let iph = BitFieldFormat::compile(
        "
        u64 ipts
        u16 length
        u14 subchannel
        u1 format_error
        u1 data_error",
    )
    .expect("message IPH format is not valid");

    Schema {
        name: "Message Format 0".to_string(),
        csdw_format: Some(csdw),
        body: BodyKind::Items {
            iph_format: Arc::new(iph),
            label: ITEM_LABEL.to_string(),
            item_size: None,
        },
    }
}
