//! Orders: the placed-order model, its status machine and the read service.

mod model;
mod service;
mod status;

pub use model::{Order, OrderItem, order_number};
pub use service::OrderService;
pub use status::{OrderStatus, UnknownStatus};
