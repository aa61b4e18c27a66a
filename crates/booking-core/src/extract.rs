use serde_json::Value;
use tracing::debug;

use crate::models::{BookingState, minor_to_major};
use crate::session::Session;
use crate::tools::{CART_CONTAINERS, ToolEnvelope, decode_cart_object, id_text, unwrap_payload};

const DIRECT_CART_ID: [&str; 2] = ["/cartId", "/cart_id"];
const DIRECT_PROMOTION_ID: [&str; 3] = ["/addCartOffer/offer/id", "/offer/id", "/promotionOfferId"];
const DIRECT_ITEM_ID: [&str; 2] = ["/selectedItemId", "/addCartSelectedBookableItem/selectedItem/id"];
const DIRECT_STAFF_VARIANT_ID: [&str; 1] = ["/staffVariantId"];
const DIRECT_BOOKABLE_TIME_ID: [&str; 2] = ["/bookableTime/id", "/bookableTimeId"];
const DIRECT_CLIENT_EMAIL: [&str; 2] = ["/clientEmail", "/clientInformation/email"];
const DIRECT_TOTAL: [&str; 1] = ["/summary/total"];

/// Booking fields found in one tool payload. Within a payload the first
/// probe that finds a value wins.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HarvestedFields {
    pub cart_id: Option<String>,
    pub promotion_offer_id: Option<String>,
    pub service_item_id: Option<String>,
    pub staff_variant_id: Option<String>,
    pub bookable_time_id: Option<String>,
    pub client_email: Option<String>,
    pub total_amount: Option<f64>,
}

impl HarvestedFields {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    fn apply(self, booking: &mut BookingState) {
        set_if_found(&mut booking.cart_id, self.cart_id);
        set_if_found(&mut booking.promotion_offer_id, self.promotion_offer_id);
        set_if_found(&mut booking.service_item_id, self.service_item_id);
        set_if_found(&mut booking.staff_variant_id, self.staff_variant_id);
        set_if_found(&mut booking.bookable_time_id, self.bookable_time_id);
        set_if_found(&mut booking.client_email, self.client_email);
        set_if_found(&mut booking.total_amount, self.total_amount);
    }
}

pub fn harvest(payload: &Value) -> HarvestedFields {
    let mut fields = HarvestedFields::default();

    for cart in CART_CONTAINERS
        .iter()
        .filter_map(|pointer| payload.pointer(pointer))
        .filter_map(decode_cart_object)
    {
        let last_line = cart.selected_items.last();
        keep_first(&mut fields.cart_id, cart.id.clone());
        keep_first(&mut fields.promotion_offer_id, cart.offer_ids.first().cloned());
        keep_first(
            &mut fields.service_item_id,
            last_line.map(|line| line.id.clone()),
        );
        keep_first(
            &mut fields.staff_variant_id,
            last_line.and_then(|line| line.staff_variant_id.clone()),
        );
        keep_first(&mut fields.bookable_time_id, cart.bookable_time_id.clone());
        keep_first(&mut fields.client_email, cart.client_email.clone());
        keep_first(&mut fields.total_amount, cart.total);
    }

    keep_first(&mut fields.cart_id, probe_text(payload, &DIRECT_CART_ID));
    keep_first(
        &mut fields.promotion_offer_id,
        probe_text(payload, &DIRECT_PROMOTION_ID),
    );
    keep_first(&mut fields.service_item_id, probe_text(payload, &DIRECT_ITEM_ID));
    keep_first(
        &mut fields.staff_variant_id,
        probe_text(payload, &DIRECT_STAFF_VARIANT_ID),
    );
    keep_first(
        &mut fields.bookable_time_id,
        probe_text(payload, &DIRECT_BOOKABLE_TIME_ID),
    );
    keep_first(&mut fields.client_email, probe_text(payload, &DIRECT_CLIENT_EMAIL));
    keep_first(
        &mut fields.total_amount,
        DIRECT_TOTAL
            .iter()
            .filter_map(|pointer| payload.pointer(pointer))
            .find_map(Value::as_f64)
            .map(minor_to_major),
    );

    fields
}

/// Merges whatever booking fields a raw tool output carries into the
/// session. Thread fields are restored afterwards whatever the payload holds.
pub fn merge_tool_output(tool_output: &Value, session: &mut Session) {
    let Ok(payload) = unwrap_payload(tool_output.clone()) else {
        return;
    };
    merge_payload(&payload, session);
}

pub fn merge_envelope(envelope: &ToolEnvelope, session: &mut Session) {
    if let Some(payload) = envelope.payload() {
        merge_payload(payload, session);
    }
}

fn merge_payload(payload: &Value, session: &mut Session) {
    let protected_thread = session.thread.clone();

    let fields = harvest(payload);
    if !fields.is_empty() {
        debug!(session_id = %session.id, fields = ?fields, "merged tool output into booking state");
    }
    fields.apply(&mut session.booking);

    session.thread = protected_thread;
}

fn probe_text(payload: &Value, pointers: &[&str]) -> Option<String> {
    pointers
        .iter()
        .filter_map(|pointer| payload.pointer(pointer))
        .find_map(id_text)
}

fn keep_first<T>(slot: &mut Option<T>, candidate: Option<T>) {
    if slot.is_none() {
        *slot = candidate;
    }
}

fn set_if_found<T>(slot: &mut Option<T>, found: Option<T>) {
    if found.is_some() {
        *slot = found;
    }
}
