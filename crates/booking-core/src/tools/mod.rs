mod catalog;
mod envelope;
mod executor;
mod gateway;
mod minimize;

pub use catalog::{CART_ID_ARGUMENT, ToolName};
pub(crate) use catalog::CART_CONTAINERS;
pub use envelope::unwrap_payload;
pub use executor::{
    HttpToolExecutor, HttpToolExecutorConfig, ToolExecutor, ToolExecutorError,
    ToolExecutorFuture, ToolInvocation,
};
pub use gateway::{ToolEnvelope, ToolGateway};
pub use minimize::{
    CartLine, CartView, CheckoutView, NamedItem, ServiceItem, TimeSlot, ToolOutput,
};
pub(crate) use minimize::{decode_cart_object, id_text};
