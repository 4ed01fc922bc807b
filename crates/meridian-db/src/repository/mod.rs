//! # Repositories
//!
//! One repository per aggregate. Read paths hold the pool; everything that
//! participates in the checkout / restock transactions is an associated
//! function taking `&mut SqliteConnection`, so it composes inside a single
//! sqlx transaction.

pub mod movement;
pub mod order;
pub mod product;
pub mod shop;
pub mod variant;

pub use movement::{MovementRepository, NewStockMovement};
pub use order::{NewOrder, NewOrderItem, OrderRepository, RestockLine};
pub use product::{NewProduct, ProductRepository};
pub use shop::ShopRepository;
pub use variant::{LockedVariant, NewVariant, VariantRepository};
