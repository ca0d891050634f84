// Order mutation & settlement core
pub mod order_items;
pub mod order_split;
pub mod orders;
pub mod reservations;

// Payment schedule management
pub mod installments;

// Derived-state reconciliation
pub mod alerts;
