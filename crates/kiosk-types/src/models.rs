use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// -- Identifiers --

macro_rules! id_type {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(UserId);
id_type!(CategoryId);
id_type!(SubcategoryId);
id_type!(ProductId);
id_type!(MethodId);

/// Catalog entity kinds, used to label `NotFound` and integrity faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Entity {
    Category,
    Subcategory,
    Product,
    PurchaseMethod,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Category => "category",
            Self::Subcategory => "subcategory",
            Self::Product => "product",
            Self::PurchaseMethod => "purchase method",
        })
    }
}

// -- Roles --

/// Staff hierarchy. Declaration order is the rank order, so the derived
/// `Ord` is the authorization order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Moderator,
    Admin,
    Owner,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::User, Role::Moderator, Role::Admin, Role::Owner];

    /// Roles the owner may hand out through the roster.
    pub const GRANTABLE: [Role; 2] = [Role::Admin, Role::Moderator];

    pub fn rank(self) -> u8 {
        match self {
            Self::User => 0,
            Self::Moderator => 1,
            Self::Admin => 2,
            Self::Owner => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Moderator => "moderator",
            Self::Admin => "admin",
            Self::Owner => "owner",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Self::User),
            "moderator" => Some(Self::Moderator),
            "admin" => Some(Self::Admin),
            "owner" => Some(Self::Owner),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaffEntry {
    pub user_id: UserId,
    pub role: Role,
}

// -- Catalog --

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub title: String,
    pub sort: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subcategory {
    pub id: SubcategoryId,
    pub category_id: CategoryId,
    pub title: String,
    pub sort: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Photo,
    Video,
}

impl MediaKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Photo => "photo",
            Self::Video => "video",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "photo" => Some(Self::Photo),
            "video" => Some(Self::Video),
            _ => None,
        }
    }
}

/// Opaque media token issued by the chat transport. Never inspected here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRef {
    pub kind: MediaKind,
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub subcategory_id: SubcategoryId,
    pub title: String,
    /// Free-form; empty means no price is shown.
    pub price: String,
    pub description: String,
    pub media: Option<MediaRef>,
    pub active: bool,
    pub sort: i64,
}

/// Fields of a product that the edit form can change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductField {
    Title,
    Price,
    Description,
    Media,
}

impl ProductField {
    pub const ALL: [ProductField; 4] = [
        ProductField::Title,
        ProductField::Price,
        ProductField::Description,
        ProductField::Media,
    ];
}

/// A single field change applied by `update_product`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProductUpdate {
    Title(String),
    Price(String),
    Description(String),
    Media(Option<MediaRef>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProduct {
    pub subcategory_id: SubcategoryId,
    pub title: String,
    pub price: String,
    pub description: String,
    pub media: Option<MediaRef>,
}

// -- Purchase methods --

pub const DEFAULT_BUY_LABEL: &str = "Buy";
pub const DEFAULT_CONTACT_TEMPLATE: &str = "Hello! I would like to buy product #{product_id}.";
pub const PRODUCT_ID_PLACEHOLDER: &str = "{product_id}";

const LINK_SCHEMES: &[&str] = &["https://", "http://", "tg://"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayloadError {
    #[error("url is empty")]
    EmptyUrl,
    #[error("url must start with http://, https:// or tg://")]
    UnsupportedScheme,
    #[error("contact handle is empty")]
    EmptyHandle,
    #[error("contact template must contain {{product_id}}")]
    MissingPlaceholder,
    #[error("instruction text is empty")]
    EmptyInstruction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseKindTag {
    Link,
    Contact,
    Instruction,
}

impl PurchaseKindTag {
    pub const ALL: [PurchaseKindTag; 3] = [
        PurchaseKindTag::Link,
        PurchaseKindTag::Contact,
        PurchaseKindTag::Instruction,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Link => "link",
            Self::Contact => "contact",
            Self::Instruction => "instruction",
        }
    }

    /// Builds and validates a payload of this kind from one line of staff input.
    pub fn payload(self, input: &str) -> Result<PurchaseKind, PayloadError> {
        match self {
            Self::Link => PurchaseKind::link(input),
            Self::Contact => PurchaseKind::contact(input, DEFAULT_CONTACT_TEMPLATE),
            Self::Instruction => PurchaseKind::instruction(input),
        }
    }
}

/// How a "buy" action is fulfilled. Stored as JSON, one variant per kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PurchaseKind {
    Link { url: String },
    Contact { handle: String, template: String },
    Instruction { text: String },
}

impl PurchaseKind {
    pub fn link(url: &str) -> Result<Self, PayloadError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(PayloadError::EmptyUrl);
        }
        let rest = LINK_SCHEMES
            .iter()
            .find_map(|scheme| url.strip_prefix(scheme))
            .ok_or(PayloadError::UnsupportedScheme)?;
        if rest.is_empty() || rest.contains(char::is_whitespace) {
            return Err(PayloadError::UnsupportedScheme);
        }
        Ok(Self::Link { url: url.to_string() })
    }

    /// Accepts `@name` or `name`; the handle is stored without the `@`.
    pub fn contact(handle: &str, template: &str) -> Result<Self, PayloadError> {
        let handle = handle.trim();
        let handle = handle.strip_prefix('@').unwrap_or(handle).trim();
        if handle.is_empty() {
            return Err(PayloadError::EmptyHandle);
        }
        if !template.contains(PRODUCT_ID_PLACEHOLDER) {
            return Err(PayloadError::MissingPlaceholder);
        }
        Ok(Self::Contact {
            handle: handle.to_string(),
            template: template.to_string(),
        })
    }

    pub fn instruction(text: &str) -> Result<Self, PayloadError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(PayloadError::EmptyInstruction);
        }
        Ok(Self::Instruction { text: text.to_string() })
    }

    pub fn tag(&self) -> PurchaseKindTag {
        match self {
            Self::Link { .. } => PurchaseKindTag::Link,
            Self::Contact { .. } => PurchaseKindTag::Contact,
            Self::Instruction { .. } => PurchaseKindTag::Instruction,
        }
    }

    /// Re-runs the constructor checks on an already-built value.
    pub fn validate(&self) -> Result<(), PayloadError> {
        match self {
            Self::Link { url } => Self::link(url).map(|_| ()),
            Self::Contact { handle, template } => Self::contact(handle, template).map(|_| ()),
            Self::Instruction { text } => Self::instruction(text).map(|_| ()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseMethod {
    pub id: MethodId,
    pub product_id: ProductId,
    pub kind: PurchaseKind,
    pub label: String,
    pub sort: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMethod {
    pub kind: PurchaseKind,
    pub label: String,
}

// -- Settings --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettingKey {
    StartText,
    SupportText,
    GroupWelcomeText,
    GroupWelcomeButton,
    ShopGreeting,
    CatalogPrompt,
}

impl SettingKey {
    pub const ALL: [SettingKey; 6] = [
        SettingKey::StartText,
        SettingKey::SupportText,
        SettingKey::GroupWelcomeText,
        SettingKey::GroupWelcomeButton,
        SettingKey::ShopGreeting,
        SettingKey::CatalogPrompt,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::StartText => "start_text",
            Self::SupportText => "support_text",
            Self::GroupWelcomeText => "group_welcome_text",
            Self::GroupWelcomeButton => "group_welcome_button",
            Self::ShopGreeting => "shop_greeting",
            Self::CatalogPrompt => "catalog_prompt",
        }
    }

    pub fn default_value(self) -> &'static str {
        match self {
            Self::StartText => "Hi! Tap the button below to open the shop:",
            Self::SupportText => "Support\nWrite to our manager: @your_manager_username",
            Self::GroupWelcomeText => "Welcome! Would you like to see our products?\nTap the button below.",
            Self::GroupWelcomeButton => "Open the shop",
            Self::ShopGreeting => "Welcome to the shop! Pick a section:",
            Self::CatalogPrompt => "Pick a category:",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_order_matches_rank() {
        for a in Role::ALL {
            for b in Role::ALL {
                assert_eq!(a >= b, a.rank() >= b.rank(), "{a:?} vs {b:?}");
            }
        }
    }

    #[test]
    fn role_string_roundtrip() {
        for role in Role::ALL {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
        assert_eq!(Role::parse("mod"), None);
    }

    #[test]
    fn link_requires_known_scheme() {
        assert!(PurchaseKind::link("https://example.com/buy").is_ok());
        assert!(PurchaseKind::link("tg://resolve?domain=shop").is_ok());
        assert_eq!(PurchaseKind::link("   "), Err(PayloadError::EmptyUrl));
        assert_eq!(
            PurchaseKind::link("ftp://example.com"),
            Err(PayloadError::UnsupportedScheme)
        );
        assert_eq!(PurchaseKind::link("https://"), Err(PayloadError::UnsupportedScheme));
        assert_eq!(
            PurchaseKind::link("https://exa mple.com"),
            Err(PayloadError::UnsupportedScheme)
        );
    }

    #[test]
    fn contact_strips_at_sign() {
        let kind = PurchaseKindTag::Contact.payload("@manager").unwrap();
        assert_eq!(
            kind,
            PurchaseKind::Contact {
                handle: "manager".into(),
                template: DEFAULT_CONTACT_TEMPLATE.into(),
            }
        );
        assert_eq!(PurchaseKindTag::Contact.payload("@"), Err(PayloadError::EmptyHandle));
        assert_eq!(
            PurchaseKind::contact("manager", "no placeholder"),
            Err(PayloadError::MissingPlaceholder)
        );
    }

    #[test]
    fn payload_json_is_tagged_by_kind() {
        let kind = PurchaseKind::Instruction { text: "Pay at the counter".into() };
        let json = serde_json::to_value(&kind).unwrap();
        assert_eq!(json["kind"], "instruction");
        assert_eq!(json["text"], "Pay at the counter");
    }
}
