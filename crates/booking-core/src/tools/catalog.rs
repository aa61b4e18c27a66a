use std::fmt;

use serde::{Deserialize, Serialize};

/// JSON pointers under which tool payloads nest the cart object.
pub(crate) const CART_CONTAINERS: [&str; 10] = [
    "/cart",
    "/data/cart",
    "/createCart/cart",
    "/addCartSelectedBookableItem/cart",
    "/reserveCartBookableItems/cart",
    "/updateCartSelectedBookableItem/cart",
    "/addCartOffer/cart",
    "/updateCart/cart",
    "/addCartCardPaymentMethod/cart",
    "/checkoutCart/cart",
];

pub const CART_ID_ARGUMENT: &str = "cartId";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolName {
    ListLocations,
    CreateCart,
    ListServices,
    AddService,
    ListBookableDates,
    ListBookableTimes,
    ReserveSlot,
    ListStaffVariants,
    AssignStaff,
    GetCartSummary,
    ApplyPromotion,
    UpdateClientInfo,
    AddPaymentMethod,
    CheckoutCart,
    PreparePayment,
}

impl ToolName {
    pub const ALL: [ToolName; 15] = [
        Self::ListLocations,
        Self::CreateCart,
        Self::ListServices,
        Self::AddService,
        Self::ListBookableDates,
        Self::ListBookableTimes,
        Self::ReserveSlot,
        Self::ListStaffVariants,
        Self::AssignStaff,
        Self::GetCartSummary,
        Self::ApplyPromotion,
        Self::UpdateClientInfo,
        Self::AddPaymentMethod,
        Self::CheckoutCart,
        Self::PreparePayment,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ListLocations => "list_locations",
            Self::CreateCart => "create_cart",
            Self::ListServices => "list_services",
            Self::AddService => "add_service",
            Self::ListBookableDates => "list_bookable_dates",
            Self::ListBookableTimes => "list_bookable_times",
            Self::ReserveSlot => "reserve_slot",
            Self::ListStaffVariants => "list_staff_variants",
            Self::AssignStaff => "assign_staff",
            Self::GetCartSummary => "get_cart_summary",
            Self::ApplyPromotion => "apply_promotion",
            Self::UpdateClientInfo => "update_client_info",
            Self::AddPaymentMethod => "add_payment_method",
            Self::CheckoutCart => "checkout_cart",
            Self::PreparePayment => "prepare_payment",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        Self::ALL.into_iter().find(|tool| tool.as_str() == raw)
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
