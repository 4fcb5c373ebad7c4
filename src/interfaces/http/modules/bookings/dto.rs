//! Booking DTOs

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::application::services::{BookingReceipt, ReleaseReceipt};
use crate::interfaces::http::modules::accounts::LedgerEntryDto;
use crate::interfaces::http::modules::facilities::{FacilityDto, SlotDto};

#[derive(Debug, Deserialize, IntoParams)]
pub struct BookQuery {
    /// Rate the client displayed; rejected when it no longer matches
    pub expected_rate: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BookingDto {
    pub facility: FacilityDto,
    pub slot: SlotDto,
    pub new_balance: i64,
    pub entry: LedgerEntryDto,
}

impl BookingDto {
    pub fn new(receipt: BookingReceipt, viewer: &str, is_admin: bool) -> Self {
        Self {
            facility: receipt.facility.into(),
            slot: SlotDto::for_viewer(receipt.slot, viewer, is_admin),
            new_balance: receipt.new_balance,
            entry: receipt.entry.into(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ReleaseDto {
    pub facility: FacilityDto,
    pub slot: SlotDto,
    /// Always zero: bookings are not refunded
    pub refunded: i64,
}

impl ReleaseDto {
    pub fn new(receipt: ReleaseReceipt, viewer: &str, is_admin: bool) -> Self {
        Self {
            facility: receipt.facility.into(),
            slot: SlotDto::for_viewer(receipt.slot, viewer, is_admin),
            refunded: 0,
        }
    }
}
