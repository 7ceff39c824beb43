//! Core domain types for the ordering engine.
//!
//! Menu entries ([`Beverage`], [`BeverageSize`]), the cart and persisted
//! orders ([`Order`], [`OrderItem`]), customer details and the order status
//! lifecycle: `pending → confirmed → preparing → ready → (out_for_delivery →
//! delivered) | cancelled`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Declares a string-backed identifier newtype.
macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates the identifier from any string-like value
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the inner string value
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(
    /// Identifier of a persisted order, assigned by the backend
    OrderId
);
string_id!(
    /// Identifier of a cart line, assigned by the engine when the line is created
    OrderItemId
);
string_id!(
    /// Identifier of a menu beverage
    BeverageId
);
string_id!(
    /// Identifier of a size, unique within its beverage
    SizeId
);
string_id!(
    /// Human-shareable order reference such as `LM1000`
    ConfirmationNumber
);

/// Correlates a facade call with the action that completes it
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(u64);

impl RequestId {
    /// Wraps a raw correlation value
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw value
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

/// Money amount in cents (to avoid floating point issues)
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Zero dollars
    pub const ZERO: Self = Self(0);

    /// Creates a new money amount from cents
    #[must_use]
    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    /// Creates a money amount from a decimal dollar value.
    ///
    /// Rounds half away from zero at the cent boundary; non-finite input
    /// yields zero.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)] // saturating float-to-int cast is intended
    pub fn from_decimal(dollars: f64) -> Self {
        if !dollars.is_finite() {
            return Self::ZERO;
        }
        Self((dollars * 100.0).round() as i64)
    }

    /// Returns the value in cents
    #[must_use]
    pub const fn cents(self) -> i64 {
        self.0
    }

    /// Returns true if the amount is below zero
    #[must_use]
    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// Multiplies by a quantity, saturating on overflow
    #[must_use]
    pub const fn times(self, quantity: u32) -> Self {
        Self(self.0.saturating_mul(quantity as i64))
    }
}

impl std::ops::Add for Money {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, |acc, m| acc + m)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&crate::pricing::format_currency(*self))
    }
}

/// One purchasable size of a beverage
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BeverageSize {
    /// Size identifier, unique within the beverage
    pub id: SizeId,
    /// Display name, e.g. "Medium (12oz)"
    pub name: String,
    /// Unit price
    pub price: Money,
}

/// A menu entry
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Beverage {
    /// Beverage identifier
    pub id: BeverageId,
    /// Display name
    pub name: String,
    /// Short description
    pub description: String,
    /// Menu grouping, e.g. "Lemonade"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Available sizes (never empty for a valid beverage)
    pub sizes: Vec<BeverageSize>,
}

impl Beverage {
    /// Looks up one of this beverage's sizes
    #[must_use]
    pub fn size(&self, size_id: &SizeId) -> Option<&BeverageSize> {
        self.sizes.iter().find(|size| &size.id == size_id)
    }

    /// Checks the menu invariants: at least one size, unique size ids,
    /// no negative prices.
    ///
    /// # Errors
    ///
    /// Returns a description of the first violated invariant.
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.sizes.is_empty() {
            return Err(format!("Beverage '{}' has no sizes", self.name));
        }

        for (index, size) in self.sizes.iter().enumerate() {
            if self.sizes[..index].iter().any(|other| other.id == size.id) {
                return Err(format!(
                    "Beverage '{}' has duplicate size id '{}'",
                    self.name, size.id
                ));
            }
            if size.price.is_negative() {
                return Err(format!(
                    "Beverage '{}' size '{}' has a negative price",
                    self.name, size.name
                ));
            }
        }

        Ok(())
    }
}

/// A cart line as requested by the caller, before the engine assigns an id
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewItem {
    /// Beverage being ordered
    pub beverage_id: BeverageId,
    /// Beverage display name at selection time
    pub beverage_name: String,
    /// Chosen size
    pub size_id: SizeId,
    /// Size display name at selection time
    pub size_name: String,
    /// Unit price at selection time
    pub price: Money,
    /// Number of cups, expected in `1..=99`
    pub quantity: u32,
}

impl NewItem {
    /// Builds a cart line from a catalog selection, copying the current price.
    #[must_use]
    pub fn from_selection(beverage: &Beverage, size: &BeverageSize, quantity: u32) -> Self {
        Self {
            beverage_id: beverage.id.clone(),
            beverage_name: beverage.name.clone(),
            size_id: size.id.clone(),
            size_name: size.name.clone(),
            price: size.price,
            quantity,
        }
    }
}

/// A line in an order
///
/// `subtotal` always equals `price * quantity`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    /// Line identifier, stable for the line's lifetime in the cart
    pub id: OrderItemId,
    /// Beverage ordered
    pub beverage_id: BeverageId,
    /// Beverage display name
    pub beverage_name: String,
    /// Size ordered
    pub size_id: SizeId,
    /// Size display name
    pub size_name: String,
    /// Unit price
    pub price: Money,
    /// Number of cups
    pub quantity: u32,
    /// `price * quantity`
    pub subtotal: Money,
}

impl OrderItem {
    /// Creates a line from a request and an engine-assigned id
    #[must_use]
    pub fn new(id: OrderItemId, item: NewItem) -> Self {
        let subtotal = crate::pricing::item_subtotal(item.price, item.quantity);
        Self {
            id,
            beverage_id: item.beverage_id,
            beverage_name: item.beverage_name,
            size_id: item.size_id,
            size_name: item.size_name,
            price: item.price,
            quantity: item.quantity,
            subtotal,
        }
    }

    /// Sets the quantity and recomputes the subtotal
    pub fn set_quantity(&mut self, quantity: u32) {
        self.quantity = quantity;
        self.subtotal = crate::pricing::item_subtotal(self.price, quantity);
    }

    /// Whether this line is for the given beverage and size
    #[must_use]
    pub fn is_same_product(&self, beverage_id: &BeverageId, size_id: &SizeId) -> bool {
        &self.beverage_id == beverage_id && &self.size_id == size_id
    }
}

/// Delivery address; all four required fields are present or the address is absent
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    /// Street line
    pub street: String,
    /// City
    pub city: String,
    /// State or province
    pub state: String,
    /// ZIP or postal code
    pub zip_code: String,
    /// Country
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

/// Customer details attached to an order
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    /// Full name
    pub name: String,
    /// Contact email
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Contact phone
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    /// Delivery address; pickup orders have none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
}

/// Status of an order in its lifecycle
///
/// Unknown values reported by the backend are kept verbatim in
/// [`OrderStatus::Other`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum OrderStatus {
    /// Cart being built, not yet submitted
    Pending,
    /// Accepted by the backend
    Confirmed,
    /// Being made
    Preparing,
    /// Ready for pickup or dispatch
    Ready,
    /// On its way to the customer
    OutForDelivery,
    /// Handed over (terminal)
    Delivered,
    /// Cancelled (terminal)
    Cancelled,
    /// A status this engine does not know yet
    Other(String),
}

impl OrderStatus {
    /// Wire name, e.g. `out_for_delivery`
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Preparing => "preparing",
            Self::Ready => "ready",
            Self::OutForDelivery => "out_for_delivery",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
            Self::Other(raw) => raw,
        }
    }

    /// Human-readable name, e.g. `Out for Delivery`
    #[must_use]
    pub fn display_name(&self) -> &str {
        match self {
            Self::Pending => "Pending",
            Self::Confirmed => "Confirmed",
            Self::Preparing => "Preparing",
            Self::Ready => "Ready",
            Self::OutForDelivery => "Out for Delivery",
            Self::Delivered => "Delivered",
            Self::Cancelled => "Cancelled",
            Self::Other(raw) => raw,
        }
    }

    /// Delivered and cancelled orders never change again
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled)
    }

    /// Next status along the happy path, if any.
    ///
    /// Pickup orders go from `ready` straight to `delivered`; delivery orders
    /// pass through `out_for_delivery`.
    #[must_use]
    pub const fn next_in_lifecycle(&self, delivery: bool) -> Option<Self> {
        match self {
            Self::Pending => Some(Self::Confirmed),
            Self::Confirmed => Some(Self::Preparing),
            Self::Preparing => Some(Self::Ready),
            Self::Ready if delivery => Some(Self::OutForDelivery),
            Self::Ready | Self::OutForDelivery => Some(Self::Delivered),
            Self::Delivered | Self::Cancelled | Self::Other(_) => None,
        }
    }
}

impl From<String> for OrderStatus {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "pending" => Self::Pending,
            "confirmed" => Self::Confirmed,
            "preparing" => Self::Preparing,
            "ready" => Self::Ready,
            "out_for_delivery" => Self::OutForDelivery,
            "delivered" => Self::Delivered,
            "cancelled" => Self::Cancelled,
            _ => Self::Other(raw),
        }
    }
}

impl From<OrderStatus> for String {
    fn from(status: OrderStatus) -> Self {
        match status {
            OrderStatus::Other(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// One entry of an order's status history
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange {
    /// Status entered
    pub status: OrderStatus,
    /// When it was entered
    pub timestamp: DateTime<Utc>,
    /// Optional note for the customer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl StatusChange {
    /// Creates a history entry
    #[must_use]
    pub fn new(status: OrderStatus, timestamp: DateTime<Utc>, message: Option<String>) -> Self {
        Self {
            status,
            timestamp,
            message,
        }
    }
}

/// An order: the in-progress cart, or a persisted order reported by the backend
///
/// `total` always equals the sum of the item subtotals.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    /// Backend-assigned id (`None` for the cart)
    #[serde(default)]
    pub id: Option<OrderId>,
    /// Lines in the order
    pub items: Vec<OrderItem>,
    /// Customer details
    pub customer: Customer,
    /// Sum of item subtotals
    pub total: Money,
    /// Current status
    pub status: OrderStatus,
    /// Every status the order has been in, oldest first
    #[serde(default)]
    pub status_history: Vec<StatusChange>,
    /// When the backend accepted the order
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// Last backend-side change
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    /// Backend-assigned confirmation number
    #[serde(default)]
    pub confirmation_number: Option<ConfirmationNumber>,
}

impl Order {
    /// An empty `pending` cart whose history records its creation at `now`
    #[must_use]
    pub fn empty(now: DateTime<Utc>) -> Self {
        Self {
            id: None,
            items: Vec::new(),
            customer: Customer::default(),
            total: Money::ZERO,
            status: OrderStatus::Pending,
            status_history: vec![StatusChange::new(OrderStatus::Pending, now, None)],
            created_at: None,
            updated_at: None,
            confirmation_number: None,
        }
    }

    /// Recomputes `total` from the item subtotals
    pub fn recalculate_total(&mut self) {
        self.total = crate::pricing::order_total(&self.items);
    }

    /// Whether the order has no lines
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Total number of cups across all lines
    #[must_use]
    pub fn item_count(&self) -> u64 {
        self.items.iter().map(|item| u64::from(item.quantity)).sum()
    }

    /// Orders with an address are delivered; the rest are picked up
    #[must_use]
    pub const fn is_delivery(&self) -> bool {
        self.customer.address.is_some()
    }

    /// The submission payload: the order minus backend-assigned fields
    #[must_use]
    pub fn to_submission(&self) -> NewOrder {
        NewOrder {
            items: self.items.clone(),
            customer: self.customer.clone(),
            total: self.total,
            status: self.status.clone(),
            status_history: self.status_history.clone(),
        }
    }
}

/// An order as submitted: no id, confirmation number or timestamps yet
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrder {
    /// Lines in the order
    pub items: Vec<OrderItem>,
    /// Customer details
    pub customer: Customer,
    /// Sum of item subtotals
    pub total: Money,
    /// Status at submission (normally `pending`)
    pub status: OrderStatus,
    /// History so far
    pub status_history: Vec<StatusChange>,
}

/// Filter for customer order lookups; matches on email OR phone
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerLookup {
    /// Email to match (case-insensitive)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Phone to match (exact)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

impl CustomerLookup {
    /// Lookup by email only
    #[must_use]
    pub fn by_email(email: impl Into<String>) -> Self {
        Self {
            email: Some(email.into()),
            phone: None,
        }
    }

    /// Lookup by phone only
    #[must_use]
    pub fn by_phone(phone: impl Into<String>) -> Self {
        Self {
            email: None,
            phone: Some(phone.into()),
        }
    }

    /// Lookup using whatever contact details the customer has
    #[must_use]
    pub fn for_customer(customer: &Customer) -> Self {
        Self {
            email: customer.email.clone(),
            phone: customer.phone.clone(),
        }
    }

    /// True when neither email nor phone is set (matches every order)
    #[must_use]
    pub fn is_empty(&self) -> bool {
        non_blank(self.email.as_deref()).is_none() && non_blank(self.phone.as_deref()).is_none()
    }

    /// Whether an order placed by `customer` satisfies this lookup
    #[must_use]
    pub fn matches(&self, customer: &Customer) -> bool {
        if self.is_empty() {
            return true;
        }

        let email_matches = non_blank(self.email.as_deref()).is_some_and(|wanted| {
            customer
                .email
                .as_deref()
                .is_some_and(|email| email.eq_ignore_ascii_case(wanted))
        });
        let phone_matches = non_blank(self.phone.as_deref())
            .is_some_and(|wanted| customer.phone.as_deref() == Some(wanted));

        email_matches || phone_matches
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Raw checkout form input; every field is free text while the user types
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerFormData {
    /// Name field
    pub name: String,
    /// Email field
    pub email: String,
    /// Phone field
    pub phone: String,
    /// Street field
    pub street: String,
    /// City field
    pub city: String,
    /// State/province field
    pub state: String,
    /// ZIP/postal code field
    pub zip_code: String,
    /// Country field
    pub country: String,
}

/// Form field a validation message belongs to
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FormField {
    /// Name
    Name,
    /// Email
    Email,
    /// Phone
    Phone,
    /// Street
    Street,
    /// City
    City,
    /// State or province
    State,
    /// ZIP or postal code
    ZipCode,
    /// Country
    Country,
    /// Not tied to a single field (e.g. missing contact details)
    General,
}

impl FormField {
    /// Field key as used by forms, e.g. `zipCode`
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Email => "email",
            Self::Phone => "phone",
            Self::Street => "street",
            Self::City => "city",
            Self::State => "state",
            Self::ZipCode => "zipCode",
            Self::Country => "country",
            Self::General => "general",
        }
    }
}

impl fmt::Display for FormField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validation message for one form field
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Offending field
    pub field: FormField,
    /// User-facing message
    pub message: String,
}

impl FieldError {
    /// Creates a field error
    #[must_use]
    pub fn new(field: FormField, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}
