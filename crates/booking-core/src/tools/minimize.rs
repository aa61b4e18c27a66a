use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::catalog::{CART_CONTAINERS, ToolName};
use crate::matcher::{OptionCandidate, clock_from_timestamp, date_from_timestamp, date_label};
use crate::models::minor_to_major;

const GENERIC_MESSAGE_MAX_CHARS: usize = 280;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NamedItem {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceItem {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSlot {
    pub id: String,
    pub start_time: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub staff_variant_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartView {
    pub id: Option<String>,
    pub selected_items: Vec<CartLine>,
    pub bookable_time_id: Option<String>,
    pub start_time: Option<String>,
    pub client_email: Option<String>,
    /// Major currency units.
    pub total: Option<f64>,
    pub offer_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutView {
    pub cart_id: Option<String>,
    pub completed: bool,
    pub appointment_ids: Vec<String>,
}

/// The LLM-context shape of a tool result, one variant per known payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ToolOutput {
    Locations {
        locations: Vec<NamedItem>,
    },
    Services {
        services: Vec<ServiceItem>,
    },
    BookableDates {
        dates: Vec<String>,
    },
    BookableTimes {
        times: Vec<TimeSlot>,
    },
    StaffVariants {
        staff: Vec<NamedItem>,
    },
    Cart {
        cart: CartView,
    },
    Checkout {
        checkout: CheckoutView,
    },
    Generic {
        status: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

impl ToolOutput {
    pub fn decode(tool: Option<ToolName>, payload: &Value) -> Self {
        let decoded = match tool {
            Some(ToolName::ListLocations) => decode_locations(payload),
            Some(ToolName::ListServices) => decode_services(payload),
            Some(ToolName::ListBookableDates) => decode_dates(payload),
            Some(ToolName::ListBookableTimes) => decode_times(payload),
            Some(ToolName::ListStaffVariants) => decode_staff(payload),
            Some(ToolName::CheckoutCart) => decode_checkout(payload),
            Some(
                ToolName::CreateCart
                | ToolName::AddService
                | ToolName::ReserveSlot
                | ToolName::AssignStaff
                | ToolName::GetCartSummary
                | ToolName::ApplyPromotion
                | ToolName::UpdateClientInfo
                | ToolName::AddPaymentMethod
                | ToolName::PreparePayment,
            ) => decode_cart(payload).map(|cart| Self::Cart { cart }),
            None => None,
        };

        decoded.unwrap_or_else(|| generic(payload))
    }

    /// Selectable options carried by listing results.
    pub fn options(&self) -> Option<Vec<OptionCandidate>> {
        let options = match self {
            Self::Locations { locations } => locations
                .iter()
                .map(|item| OptionCandidate::new(&item.id, &item.name))
                .collect(),
            Self::Services { services } => services
                .iter()
                .map(|item| OptionCandidate::new(&item.id, &item.name))
                .collect(),
            Self::BookableDates { dates } => dates
                .iter()
                .map(|date| {
                    let label = date_from_timestamp(date)
                        .map(date_label)
                        .unwrap_or_else(|| date.clone());
                    OptionCandidate::new(date, label)
                })
                .collect(),
            Self::BookableTimes { times } => times
                .iter()
                .map(|slot| OptionCandidate::new(&slot.id, &slot.label).with_start(&slot.start_time))
                .collect(),
            Self::StaffVariants { staff } => staff
                .iter()
                .map(|item| OptionCandidate::new(&item.id, &item.name))
                .collect(),
            Self::Cart { .. } | Self::Checkout { .. } | Self::Generic { .. } => return None,
        };
        Some(options)
    }

    pub fn cart(&self) -> Option<&CartView> {
        match self {
            Self::Cart { cart } => Some(cart),
            _ => None,
        }
    }
}

fn decode_locations(payload: &Value) -> Option<ToolOutput> {
    let locations = decode_at::<Vec<WireNamed>>(
        payload,
        &["/locations", "/data/locations", "/businesses/0/locations", ""],
    )?;
    Some(ToolOutput::Locations {
        locations: locations.into_iter().map(WireNamed::into_item).collect(),
    })
}

fn decode_services(payload: &Value) -> Option<ToolOutput> {
    if let Some(services) = decode_at::<Vec<WireNamed>>(payload, &["/services", "/data/services"])
    {
        return Some(ToolOutput::Services {
            services: services
                .into_iter()
                .map(|item| {
                    let name = item.display_name();
                    ServiceItem {
                        id: item.id,
                        name,
                        category: None,
                    }
                })
                .collect(),
        });
    }

    let cart = cart_container(payload)?;
    let categories = decode_at::<Vec<WireCategory>>(cart, &["/availableCategories"])?;
    let services = categories
        .into_iter()
        .flat_map(|category| {
            let category_name = category.name;
            category
                .available_items
                .into_iter()
                .map(move |item| ServiceItem {
                    id: item.id.clone(),
                    name: item.display_name(),
                    category: category_name.clone(),
                })
        })
        .collect();
    Some(ToolOutput::Services { services })
}

fn decode_dates(payload: &Value) -> Option<ToolOutput> {
    let dates = decode_at::<Vec<WireDate>>(
        payload,
        &["/cartBookableDates", "/dates", "/data/cartBookableDates"],
    )?;
    Some(ToolOutput::BookableDates {
        dates: dates
            .into_iter()
            .map(|date| {
                let raw = date.into_raw();
                date_from_timestamp(&raw)
                    .map(|day| day.format("%Y-%m-%d").to_string())
                    .unwrap_or(raw)
            })
            .collect(),
    })
}

fn decode_times(payload: &Value) -> Option<ToolOutput> {
    let times = decode_at::<Vec<WireTime>>(
        payload,
        &["/cartBookableTimes", "/times", "/data/cartBookableTimes"],
    )?;
    Some(ToolOutput::BookableTimes {
        times: times
            .into_iter()
            .map(|time| {
                let label = clock_from_timestamp(&time.start_time)
                    .map(|clock| clock.display())
                    .unwrap_or_else(|| time.start_time.clone());
                TimeSlot {
                    id: time.id,
                    start_time: time.start_time,
                    label,
                }
            })
            .collect(),
    })
}

fn decode_staff(payload: &Value) -> Option<ToolOutput> {
    let variants = decode_at::<Vec<WireStaffVariant>>(
        payload,
        &[
            "/cartBookableStaffVariants",
            "/staff",
            "/data/cartBookableStaffVariants",
        ],
    )?;
    Some(ToolOutput::StaffVariants {
        staff: variants
            .into_iter()
            .map(|variant| {
                let name = variant.display_name();
                NamedItem {
                    id: variant.id,
                    name,
                }
            })
            .collect(),
    })
}

fn decode_checkout(payload: &Value) -> Option<ToolOutput> {
    let checkout = payload.pointer("/checkoutCart")?;
    let wire = WireCheckout::deserialize(checkout).ok()?;
    Some(ToolOutput::Checkout {
        checkout: CheckoutView {
            cart_id: wire.cart.and_then(|cart| cart.id),
            completed: true,
            appointment_ids: wire
                .appointments
                .into_iter()
                .filter_map(|appointment| appointment.appointment_id.or(appointment.id))
                .collect(),
        },
    })
}

pub(crate) fn decode_cart(payload: &Value) -> Option<CartView> {
    decode_cart_object(cart_container(payload)?)
}

pub(crate) fn decode_cart_object(cart: &Value) -> Option<CartView> {
    WireCart::deserialize(cart).ok().map(WireCart::into_view)
}

pub(crate) fn cart_container(payload: &Value) -> Option<&Value> {
    CART_CONTAINERS
        .iter()
        .filter_map(|pointer| payload.pointer(pointer))
        .find(|value| value.is_object())
}

fn decode_at<T: DeserializeOwned>(payload: &Value, pointers: &[&str]) -> Option<T> {
    pointers
        .iter()
        .filter_map(|pointer| payload.pointer(pointer))
        .find_map(|value| T::deserialize(value).ok())
}

fn generic(payload: &Value) -> ToolOutput {
    let status = payload
        .pointer("/status")
        .and_then(Value::as_str)
        .unwrap_or("ok")
        .to_string();
    let id = ["/id", "/cart/id", "/data/id"]
        .iter()
        .filter_map(|pointer| payload.pointer(pointer))
        .find_map(id_text);
    let message = match payload {
        Value::String(text) => Some(text.clone()),
        _ => payload
            .pointer("/message")
            .and_then(Value::as_str)
            .map(ToString::to_string),
    }
    .map(|message| message.chars().take(GENERIC_MESSAGE_MAX_CHARS).collect());

    ToolOutput::Generic {
        status,
        id,
        message,
    }
}

pub(crate) fn id_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if !text.trim().is_empty() => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn de_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let value = Value::deserialize(deserializer)?;
    id_text(&value).ok_or_else(|| D::Error::custom("expected string or numeric id"))
}

fn de_opt_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(id_text(&Value::deserialize(deserializer)?))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireNamed {
    #[serde(deserialize_with = "de_id")]
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
}

impl WireNamed {
    fn display_name(&self) -> String {
        self.name
            .clone()
            .or_else(|| self.display_name.clone())
            .unwrap_or_else(|| self.id.clone())
    }

    fn into_item(self) -> NamedItem {
        let name = self.display_name();
        NamedItem { id: self.id, name }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireCategory {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    available_items: Vec<WireNamed>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WireDate {
    Text(String),
    Entry { date: String },
}

impl WireDate {
    fn into_raw(self) -> String {
        match self {
            Self::Text(raw) | Self::Entry { date: raw } => raw,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireTime {
    #[serde(deserialize_with = "de_id")]
    id: String,
    start_time: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireStaffVariant {
    #[serde(deserialize_with = "de_id")]
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    staff: Option<WireNamed>,
}

impl WireStaffVariant {
    fn display_name(&self) -> String {
        self.staff
            .as_ref()
            .map(WireNamed::display_name)
            .or_else(|| self.name.clone())
            .unwrap_or_else(|| self.id.clone())
    }
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct WireCart {
    #[serde(deserialize_with = "de_opt_id")]
    id: Option<String>,
    selected_items: Vec<WireSelectedItem>,
    selected_bookable_time: Option<WireBookableTime>,
    client_information: Option<WireClient>,
    summary: Option<WireSummary>,
    offers: Vec<WireOffer>,
}

impl WireCart {
    fn into_view(self) -> CartView {
        CartView {
            id: self.id,
            selected_items: self
                .selected_items
                .into_iter()
                .filter_map(|line| {
                    let item = line.item.unwrap_or(Value::Null);
                    Some(CartLine {
                        id: line.id?,
                        service_id: item.get("id").and_then(id_text),
                        service_name: item
                            .get("name")
                            .and_then(Value::as_str)
                            .map(ToString::to_string),
                        staff_variant_id: line
                            .selected_staff_variant
                            .and_then(|variant| variant.id),
                    })
                })
                .collect(),
            bookable_time_id: self
                .selected_bookable_time
                .as_ref()
                .and_then(|time| time.id.clone()),
            start_time: self.selected_bookable_time.and_then(|time| time.start_time),
            client_email: self.client_information.and_then(|client| client.email),
            total: self
                .summary
                .and_then(|summary| summary.total)
                .and_then(|total| total.as_f64())
                .map(minor_to_major),
            offer_ids: self.offers.into_iter().filter_map(|offer| offer.id).collect(),
        }
    }
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct WireSelectedItem {
    #[serde(deserialize_with = "de_opt_id")]
    id: Option<String>,
    item: Option<Value>,
    selected_staff_variant: Option<WireOptionalId>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct WireBookableTime {
    #[serde(deserialize_with = "de_opt_id")]
    id: Option<String>,
    start_time: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct WireClient {
    email: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct WireSummary {
    total: Option<Value>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct WireOffer {
    #[serde(deserialize_with = "de_opt_id")]
    id: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct WireOptionalId {
    #[serde(deserialize_with = "de_opt_id")]
    id: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct WireCheckout {
    cart: Option<WireOptionalId>,
    appointments: Vec<WireAppointment>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct WireAppointment {
    #[serde(deserialize_with = "de_opt_id")]
    appointment_id: Option<String>,
    #[serde(deserialize_with = "de_opt_id")]
    id: Option<String>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn locations_keep_only_id_and_name() {
        let payload = json!({"locations": [
            {"id": "loc-1", "name": "Sandbox Location", "address": {"line1": "1 Main"}, "tz": "America/New_York"},
            {"id": 42, "name": "Uptown"}
        ]});
        let output = ToolOutput::decode(Some(ToolName::ListLocations), &payload);

        assert_eq!(
            serde_json::to_value(&output).expect("output should serialize"),
            json!({"kind": "locations", "locations": [
                {"id": "loc-1", "name": "Sandbox Location"},
                {"id": "42", "name": "Uptown"}
            ]})
        );
    }

    #[test]
    fn services_flatten_cart_categories() {
        let payload = json!({"cart": {"id": "cart-1", "availableCategories": [
            {"name": "Face", "availableItems": [{"id": "svc-1", "name": "Classic Facial", "price": 9000}]},
            {"name": "Body", "availableItems": [{"id": "svc-2", "name": "Massage"}]}
        ]}});
        let output = ToolOutput::decode(Some(ToolName::ListServices), &payload);
        let options = output.options().expect("services should carry options");

        assert_eq!(options.len(), 2);
        assert_eq!(options[0], OptionCandidate::new("svc-1", "Classic Facial"));
        assert!(matches!(
            output,
            ToolOutput::Services { ref services } if services[1].category.as_deref() == Some("Body")
        ));
    }

    #[test]
    fn dates_and_times_are_normalized_for_display() {
        let dates = ToolOutput::decode(
            Some(ToolName::ListBookableDates),
            &json!({"cartBookableDates": [{"date": "2026-05-01"}, {"date": "2026-05-02T00:00:00Z"}]}),
        );
        assert_eq!(
            dates.options().expect("dates should carry options"),
            vec![
                OptionCandidate::new("2026-05-01", "Friday, May 1"),
                OptionCandidate::new("2026-05-02", "Saturday, May 2"),
            ]
        );

        let times = ToolOutput::decode(
            Some(ToolName::ListBookableTimes),
            &json!({"cartBookableTimes": [{"id": "t-1", "startTime": "2026-05-01T14:00:00-04:00"}]}),
        );
        assert_eq!(
            times.options().expect("times should carry options"),
            vec![OptionCandidate::new("t-1", "2:00 PM").with_start("2026-05-01T14:00:00-04:00")]
        );
    }

    #[test]
    fn staff_variants_use_staff_display_name() {
        let output = ToolOutput::decode(
            Some(ToolName::ListStaffVariants),
            &json!({"cartBookableStaffVariants": [
                {"id": "sv-1", "staff": {"id": "st-1", "displayName": "Avery"}, "price": 100}
            ]}),
        );
        assert_eq!(
            output.options().expect("staff should carry options"),
            vec![OptionCandidate::new("sv-1", "Avery")]
        );
    }

    #[test]
    fn cart_mutations_decode_nested_cart() {
        let payload = json!({"reserveCartBookableItems": {"cart": {
            "id": "cart-9",
            "selectedItems": [{"id": "line-1", "item": {"id": "svc-1", "name": "Facial"}, "selectedStaffVariant": {"id": "sv-1"}}],
            "selectedBookableTime": {"id": "t-1", "startTime": "2026-05-01T14:00:00Z"},
            "summary": {"total": 12550},
            "offers": [{"id": "offer-1"}]
        }}});
        let output = ToolOutput::decode(Some(ToolName::ReserveSlot), &payload);
        let cart = output.cart().expect("reserve should decode a cart");

        assert_eq!(cart.id.as_deref(), Some("cart-9"));
        assert_eq!(cart.selected_items[0].service_id.as_deref(), Some("svc-1"));
        assert_eq!(cart.selected_items[0].staff_variant_id.as_deref(), Some("sv-1"));
        assert_eq!(cart.bookable_time_id.as_deref(), Some("t-1"));
        assert_eq!(cart.total, Some(125.5));
        assert_eq!(cart.offer_ids, vec!["offer-1".to_string()]);
    }

    #[test]
    fn unknown_tool_or_unexpected_shape_falls_back_to_generic() {
        let output = ToolOutput::decode(None, &json!({"id": 7, "message": "done", "extra": [1]}));
        assert_eq!(
            output,
            ToolOutput::Generic {
                status: "ok".to_string(),
                id: Some("7".to_string()),
                message: Some("done".to_string()),
            }
        );

        let output = ToolOutput::decode(Some(ToolName::ListLocations), &json!("no locations"));
        assert!(matches!(output, ToolOutput::Generic { message: Some(ref m), .. } if m == "no locations"));
    }
}
