//! Engine output: which screen to show and what to tell the user. Wording
//! lives in the render adapter.

use kiosk_types::api::Delivery;
use kiosk_types::events::{FormKind, Nav, Target};
use kiosk_types::models::{
    Category, Entity, Product, ProductField, PurchaseKindTag, PurchaseMethod, Role, SettingKey,
    StaffEntry, Subcategory, UserId,
};

use crate::forms::{Invalid, Offer, Step};
use crate::purchase::Dispatch;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub view: View,
    pub notice: Option<Notice>,
    pub delivery: Delivery,
}

impl Reply {
    pub fn send(view: View) -> Self {
        Self {
            view,
            notice: None,
            delivery: Delivery::Send,
        }
    }

    pub fn edit(view: View) -> Self {
        Self {
            view,
            notice: None,
            delivery: Delivery::Edit,
        }
    }

    /// Acknowledgement only; the current message stays as it is.
    pub fn notice(notice: Notice) -> Self {
        Self {
            view: View::Empty,
            notice: Some(notice),
            delivery: Delivery::Edit,
        }
    }

    pub fn with_notice(mut self, notice: Notice) -> Self {
        self.notice = Some(notice);
        self
    }

    pub fn with_delivery(mut self, delivery: Delivery) -> Self {
        self.delivery = delivery;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum View {
    /// Nothing new to show.
    Empty,
    Home {
        text: String,
        staff: bool,
    },
    Support {
        text: String,
    },
    WhoAmI {
        user: UserId,
    },
    GroupWelcome {
        text: String,
        button: String,
        link: Option<String>,
    },
    Categories {
        prompt: String,
        categories: Vec<Category>,
    },
    Subcategories {
        category: Category,
        subcategories: Vec<Subcategory>,
    },
    Products {
        subcategory: Subcategory,
        products: Vec<Product>,
        /// Inactive products are listed and marked.
        staff: bool,
    },
    ProductCard {
        product: Product,
        methods: Vec<PurchaseMethod>,
        viewer: Role,
    },
    Purchase(Dispatch),
    AdminPanel {
        role: Role,
    },
    ManageCatalog {
        categories: Vec<Category>,
    },
    ManageCategory {
        category: Category,
        subcategories: Vec<Subcategory>,
    },
    ManageSubcategory {
        subcategory: Subcategory,
        products: Vec<Product>,
    },
    ConfirmDelete {
        target: Target,
        title: String,
        back: Nav,
    },
    Roster {
        staff: Vec<StaffEntry>,
    },
    Prompt(Prompt),
}

/// A form step waiting for input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub form: FormKind,
    pub step: Step,
    pub detail: Option<Detail>,
    pub options: Vec<Offer>,
}

/// Context the prompt wording depends on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Detail {
    Kind(PurchaseKindTag),
    Field(ProductField),
    Setting { key: SettingKey, current: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Unauthorized,
    Invalid(Invalid),
    NotFound(Entity),
    /// Inactive product opened by an ordinary user.
    Unavailable,
    NoPurchase,
    NoCategories,
    NoSubcategories,
    Saved(Saved),
    AlreadySaved,
    Cancelled,
    Expired,
    Deleted(Entity),
    Toggled { active: bool },
    /// Store fault; details are only logged.
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Saved {
    CategoryAdded(String),
    SubcategoryAdded(String),
    ProductAdded(String),
    Renamed(String),
    ProductUpdated(ProductField),
    MethodSaved,
    SettingSaved(SettingKey),
    RoleGranted(UserId, Role),
    RoleRevoked(UserId),
}
