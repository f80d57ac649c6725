pub mod error;
pub mod memory;
pub mod postgres;
pub mod records;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::{InMemoryStore, InMemoryTx};
pub use postgres::{PostgresStore, PostgresTx};
pub use records::{
    AddressRecord, CartItemRecord, CartRecord, NewCartItem, NewOrder, NewOrderItem,
    OrderItemRecord, OrderRecord, ProductRecord,
};
pub use store::{Store, StoreTx};
