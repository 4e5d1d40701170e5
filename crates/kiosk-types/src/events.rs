use serde::{Deserialize, Serialize};

use crate::models::{
    CategoryId, MediaRef, MethodId, ProductField, ProductId, PurchaseKindTag, Role, SettingKey,
    SubcategoryId,
};

/// A decoded inbound chat event. The transport turns raw updates into one of
/// these before handing them to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Event {
    /// Navigation or command. Always leaves any open form.
    Nav(Nav),

    /// Selection from an option list shown by a form step.
    Choice(Choice),

    /// Free text typed by the user.
    Text(Input),

    /// Photo or video sent by the user.
    Media(MediaRef),

    /// Members joined a group chat the bot is in. `humans` excludes bots.
    MembersJoined { humans: u32 },
}

/// Free-text input with the skip sentinel already decoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum Input {
    Skip,
    Value(String),
}

impl Input {
    pub const SKIP_SENTINEL: &'static str = "-";

    pub fn decode(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed == Self::SKIP_SENTINEL {
            Self::Skip
        } else {
            Self::Value(trimmed.to_string())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleAction {
    Grant,
    Revoke,
}

/// Option tokens offered by selection steps. A form only accepts tokens it
/// enumerated for its current step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "pick", content = "value", rename_all = "snake_case")]
pub enum Choice {
    Category(CategoryId),
    Subcategory(SubcategoryId),
    Field(ProductField),
    Kind(PurchaseKindTag),
    Setting(SettingKey),
    Action(RoleAction),
    Role(Role),
}

/// Something that can be deleted behind a confirmation screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "entity", content = "id", rename_all = "snake_case")]
pub enum Target {
    Category(CategoryId),
    Subcategory(SubcategoryId),
    Product(ProductId),
    PurchaseMethod(MethodId),
}

/// Multi-step forms. Variants carrying an id edit that existing entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "form", content = "id", rename_all = "snake_case")]
pub enum FormKind {
    AddCategory,
    AddSubcategory,
    AddProduct,
    RenameCategory(CategoryId),
    RenameSubcategory(SubcategoryId),
    EditProduct(ProductId),
    AddPurchaseMethod(ProductId),
    EditPurchaseMethod(MethodId),
    EditSetting,
    ChangeRole,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "to", content = "args", rename_all = "snake_case")]
pub enum Nav {
    /// `/start`, optionally with a deep-link argument such as `shop`.
    Start { arg: Option<String> },
    Home,
    Support,
    WhoAmI,
    Catalog,
    Category(CategoryId),
    Subcategory(SubcategoryId),
    Product(ProductId),
    Buy { product: ProductId, method: MethodId },

    Admin,
    ToggleProduct(ProductId),
    ManageCatalog,
    ManageCategory(CategoryId),
    ManageSubcategory(SubcategoryId),
    Delete(Target),
    ConfirmDelete(Target),
    Roster,

    Begin(FormKind),
    Cancel,
}
