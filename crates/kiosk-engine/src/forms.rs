//! Multi-step forms as an explicit transition table.
//!
//! Every form is a fixed sequence of [`Step`]s. A step declares what input it
//! expects ([`Step::expect`]), which field the accepted value is stored under
//! ([`Step::field`]) and which step follows ([`Step::next`]). Apart from the
//! add and edit purchase-method forms, which are the same sequence, no two
//! forms share a step.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use kiosk_types::events::{Choice, FormKind, Input, RoleAction};
use kiosk_types::models::{
    CategoryId, DEFAULT_BUY_LABEL, MediaRef, MethodId, NewMethod, NewProduct, PayloadError,
    ProductField, ProductId, ProductUpdate, PurchaseKind, PurchaseKindTag, Role, SettingKey,
    SubcategoryId, UserId,
};
use thiserror::Error;
use uuid::Uuid;

use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    // Add category
    CategoryTitle,

    // Add subcategory
    SubcategoryParent,
    SubcategoryTitle,

    // Add product
    ProductCategory,
    ProductSubcategory,
    ProductTitle,
    ProductPrice,
    ProductDescription,
    ProductMedia,
    ProductKind,
    ProductPayload,
    ProductLabel,

    // Renames
    CategoryRename,
    SubcategoryRename,

    // Edit product
    EditField,
    EditValue,

    // Add or edit a purchase method
    MethodKind,
    MethodPayload,
    MethodLabel,

    // Settings
    SettingPick,
    SettingValue,

    // Staff roles
    RoleAction,
    RoleTarget,
    RoleGrant,
}

/// Input a step accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expect {
    /// Non-empty text; skip is refused.
    Title,
    /// Text, or skip for an empty value.
    OptionalText,
    /// Photo, video, or skip for none.
    Media,
    /// Purchase payload of the given kind.
    Payload(PurchaseKindTag),
    /// Button label, skip for the default.
    Label,
    /// Numeric user id other than the owner.
    Identifier,
    /// One of the options currently on screen.
    Choice,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Field {
    Category,
    Subcategory,
    Title,
    Price,
    Description,
    Media,
    Kind,
    Payload,
    Label,
    ProductField,
    Setting,
    Value,
    Action,
    Target,
    Role,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Text(String),
    Category(CategoryId),
    Subcategory(SubcategoryId),
    ProductField(ProductField),
    Kind(PurchaseKindTag),
    Payload(PurchaseKind),
    Media(Option<MediaRef>),
    Setting(SettingKey),
    Action(RoleAction),
    User(UserId),
    Role(Role),
}

impl From<Choice> for Value {
    fn from(choice: Choice) -> Self {
        match choice {
            Choice::Category(id) => Self::Category(id),
            Choice::Subcategory(id) => Self::Subcategory(id),
            Choice::Field(field) => Self::ProductField(field),
            Choice::Kind(kind) => Self::Kind(kind),
            Choice::Setting(key) => Self::Setting(key),
            Choice::Action(action) => Self::Action(action),
            Choice::Role(role) => Self::Role(role),
        }
    }
}

pub type Fields = BTreeMap<Field, Value>;

/// Why a step refused an input. The form stays on the same step.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Invalid {
    #[error("a value is required here")]
    Required,
    #[error("input is empty")]
    Empty,
    #[error("expected a number")]
    NotNumeric,
    #[error("expected text")]
    ExpectedText,
    #[error("expected a photo, a video or skip")]
    ExpectedMedia,
    #[error("expected a selection")]
    ExpectedChoice,
    #[error("that option is no longer available")]
    StaleChoice,
    #[error(transparent)]
    Payload(PayloadError),
    #[error("the owner cannot be a target")]
    OwnerTarget,
    #[error("{0}")]
    Rejected(&'static str),
}

/// A non-navigation input offered to the open form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Answer {
    Text(Input),
    Media(MediaRef),
    Choice(Choice),
}

/// One selectable option. `title` carries the entity name for catalog picks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Offer {
    pub choice: Choice,
    pub title: Option<String>,
}

impl Offer {
    pub fn plain(choice: Choice) -> Self {
        Self { choice, title: None }
    }

    pub fn titled(choice: Choice, title: impl Into<String>) -> Self {
        Self {
            choice,
            title: Some(title.into()),
        }
    }
}

pub fn required_role(form: FormKind) -> Role {
    match form {
        FormKind::ChangeRole => Role::Owner,
        _ => Role::Admin,
    }
}

pub fn first_step(form: FormKind) -> Step {
    match form {
        FormKind::AddCategory => Step::CategoryTitle,
        FormKind::AddSubcategory => Step::SubcategoryParent,
        FormKind::AddProduct => Step::ProductCategory,
        FormKind::RenameCategory(_) => Step::CategoryRename,
        FormKind::RenameSubcategory(_) => Step::SubcategoryRename,
        FormKind::EditProduct(_) => Step::EditField,
        FormKind::AddPurchaseMethod(_) | FormKind::EditPurchaseMethod(_) => Step::MethodKind,
        FormKind::EditSetting => Step::SettingPick,
        FormKind::ChangeRole => Step::RoleAction,
    }
}

impl Step {
    pub fn expect(self, fields: &Fields) -> Expect {
        match self {
            Step::CategoryTitle
            | Step::SubcategoryTitle
            | Step::ProductTitle
            | Step::CategoryRename
            | Step::SubcategoryRename => Expect::Title,

            Step::ProductPrice | Step::ProductDescription | Step::SettingValue => {
                Expect::OptionalText
            }

            Step::ProductMedia => Expect::Media,

            Step::ProductPayload | Step::MethodPayload => match fields.get(&Field::Kind) {
                Some(Value::Kind(kind)) => Expect::Payload(*kind),
                _ => Expect::Payload(PurchaseKindTag::Link),
            },

            Step::ProductLabel | Step::MethodLabel => Expect::Label,

            Step::EditValue => match fields.get(&Field::ProductField) {
                Some(Value::ProductField(ProductField::Media)) => Expect::Media,
                Some(Value::ProductField(ProductField::Price | ProductField::Description)) => {
                    Expect::OptionalText
                }
                _ => Expect::Title,
            },

            Step::RoleTarget => Expect::Identifier,

            Step::SubcategoryParent
            | Step::ProductCategory
            | Step::ProductSubcategory
            | Step::ProductKind
            | Step::EditField
            | Step::MethodKind
            | Step::SettingPick
            | Step::RoleAction
            | Step::RoleGrant => Expect::Choice,
        }
    }

    pub fn field(self) -> Field {
        match self {
            Step::SubcategoryParent | Step::ProductCategory => Field::Category,
            Step::ProductSubcategory => Field::Subcategory,
            Step::CategoryTitle
            | Step::SubcategoryTitle
            | Step::ProductTitle
            | Step::CategoryRename
            | Step::SubcategoryRename => Field::Title,
            Step::ProductPrice => Field::Price,
            Step::ProductDescription => Field::Description,
            Step::ProductMedia => Field::Media,
            Step::ProductKind | Step::MethodKind => Field::Kind,
            Step::ProductPayload | Step::MethodPayload => Field::Payload,
            Step::ProductLabel | Step::MethodLabel => Field::Label,
            Step::EditField => Field::ProductField,
            Step::EditValue | Step::SettingValue => Field::Value,
            Step::SettingPick => Field::Setting,
            Step::RoleAction => Field::Action,
            Step::RoleTarget => Field::Target,
            Step::RoleGrant => Field::Role,
        }
    }

    /// The step after this one, or `None` when the form is complete.
    pub fn next(self, fields: &Fields) -> Option<Step> {
        match self {
            Step::SubcategoryParent => Some(Step::SubcategoryTitle),
            Step::ProductCategory => Some(Step::ProductSubcategory),
            Step::ProductSubcategory => Some(Step::ProductTitle),
            Step::ProductTitle => Some(Step::ProductPrice),
            Step::ProductPrice => Some(Step::ProductDescription),
            Step::ProductDescription => Some(Step::ProductMedia),
            Step::ProductMedia => Some(Step::ProductKind),
            Step::ProductKind => Some(Step::ProductPayload),
            Step::ProductPayload => Some(Step::ProductLabel),
            Step::EditField => Some(Step::EditValue),
            Step::MethodKind => Some(Step::MethodPayload),
            Step::MethodPayload => Some(Step::MethodLabel),
            Step::SettingPick => Some(Step::SettingValue),
            Step::RoleAction => Some(Step::RoleTarget),
            Step::RoleTarget => match fields.get(&Field::Action) {
                Some(Value::Action(RoleAction::Grant)) => Some(Step::RoleGrant),
                _ => None,
            },

            Step::CategoryTitle
            | Step::SubcategoryTitle
            | Step::ProductLabel
            | Step::CategoryRename
            | Step::SubcategoryRename
            | Step::EditValue
            | Step::MethodLabel
            | Step::SettingValue
            | Step::RoleGrant => None,
        }
    }
}

/// Checks one answer against what a step expects.
pub fn validate(
    expect: Expect,
    answer: Answer,
    options: &[Offer],
    owner: UserId,
) -> Result<Value, Invalid> {
    match (expect, answer) {
        (Expect::Choice, Answer::Choice(choice)) => {
            if options.iter().any(|o| o.choice == choice) {
                Ok(Value::from(choice))
            } else {
                Err(Invalid::StaleChoice)
            }
        }
        (Expect::Choice, _) => Err(Invalid::ExpectedChoice),
        // A button from an earlier screen while text is expected.
        (_, Answer::Choice(_)) => Err(Invalid::StaleChoice),

        (Expect::Media, Answer::Media(media)) => Ok(Value::Media(Some(media))),
        (Expect::Media, Answer::Text(Input::Skip)) => Ok(Value::Media(None)),
        (Expect::Media, Answer::Text(Input::Value(_))) => Err(Invalid::ExpectedMedia),
        (_, Answer::Media(_)) => Err(Invalid::ExpectedText),

        (expect, Answer::Text(input)) => validate_text(expect, input, owner),
    }
}

fn validate_text(expect: Expect, input: Input, owner: UserId) -> Result<Value, Invalid> {
    let text = match input {
        Input::Skip => {
            return match expect {
                Expect::OptionalText => Ok(Value::Text(String::new())),
                Expect::Label => Ok(Value::Text(DEFAULT_BUY_LABEL.to_string())),
                _ => Err(Invalid::Required),
            };
        }
        Input::Value(text) if text.trim().is_empty() => return Err(Invalid::Empty),
        Input::Value(text) => text.trim().to_string(),
    };

    match expect {
        Expect::Title | Expect::OptionalText | Expect::Label => Ok(Value::Text(text)),
        Expect::Payload(kind) => kind.payload(&text).map(Value::Payload).map_err(Invalid::Payload),
        Expect::Identifier => {
            let id: i64 = text.parse().map_err(|_| Invalid::NotNumeric)?;
            let user = UserId(id);
            if user == owner {
                return Err(Invalid::OwnerTarget);
            }
            Ok(Value::User(user))
        }
        Expect::Media | Expect::Choice => Err(Invalid::ExpectedText),
    }
}

/// The single write a completed form performs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    AddCategory { title: String },
    AddSubcategory { category: CategoryId, title: String },
    AddProduct { product: NewProduct, method: NewMethod },
    RenameCategory { id: CategoryId, title: String },
    RenameSubcategory { id: SubcategoryId, title: String },
    UpdateProduct { id: ProductId, update: ProductUpdate },
    AddMethod { product: ProductId, method: NewMethod },
    UpdateMethod { id: MethodId, method: NewMethod },
    SetSetting { key: SettingKey, value: String },
    Grant { user: UserId, role: Role },
    Revoke { user: UserId },
}

/// Per-user position inside a form.
#[derive(Debug, Clone)]
pub struct ConversationState {
    /// Idempotency key for the final commit.
    pub session: Uuid,
    pub form: FormKind,
    pub step: Step,
    pub fields: Fields,
    /// Options enumerated for the current step, if it is a selection.
    pub options: Vec<Offer>,
    pub touched_at: DateTime<Utc>,
}

impl ConversationState {
    pub fn new(form: FormKind) -> Self {
        Self {
            session: Uuid::new_v4(),
            form,
            step: first_step(form),
            fields: Fields::new(),
            options: Vec::new(),
            touched_at: Utc::now(),
        }
    }

    pub fn expect(&self) -> Expect {
        self.step.expect(&self.fields)
    }

    /// Validates `answer` for the current step and merges it. Returns the next
    /// step (already entered) or `None` when the form is ready to commit.
    /// On error nothing changes.
    pub fn accept(&mut self, answer: Answer, owner: UserId) -> Result<Option<Step>, Invalid> {
        let value = validate(self.expect(), answer, &self.options, owner)?;
        self.fields.insert(self.step.field(), value);

        let next = self.step.next(&self.fields);
        if let Some(step) = next {
            self.step = step;
            self.options.clear();
        }
        Ok(next)
    }

    /// Builds the write for a completed form.
    pub fn change(&self) -> Result<Change, EngineError> {
        let change = match self.form {
            FormKind::AddCategory => Change::AddCategory {
                title: self.text(Field::Title)?,
            },
            FormKind::AddSubcategory => Change::AddSubcategory {
                category: self.pick(Field::Category, |v| match v {
                    Value::Category(id) => Some(*id),
                    _ => None,
                })?,
                title: self.text(Field::Title)?,
            },
            FormKind::AddProduct => Change::AddProduct {
                product: NewProduct {
                    subcategory_id: self.pick(Field::Subcategory, |v| match v {
                        Value::Subcategory(id) => Some(*id),
                        _ => None,
                    })?,
                    title: self.text(Field::Title)?,
                    price: self.text(Field::Price)?,
                    description: self.text(Field::Description)?,
                    media: self.media(Field::Media)?,
                },
                method: self.method()?,
            },
            FormKind::RenameCategory(id) => Change::RenameCategory {
                id,
                title: self.text(Field::Title)?,
            },
            FormKind::RenameSubcategory(id) => Change::RenameSubcategory {
                id,
                title: self.text(Field::Title)?,
            },
            FormKind::EditProduct(id) => {
                let field = self.pick(Field::ProductField, |v| match v {
                    Value::ProductField(f) => Some(*f),
                    _ => None,
                })?;
                let update = match field {
                    ProductField::Title => ProductUpdate::Title(self.text(Field::Value)?),
                    ProductField::Price => ProductUpdate::Price(self.text(Field::Value)?),
                    ProductField::Description => {
                        ProductUpdate::Description(self.text(Field::Value)?)
                    }
                    ProductField::Media => ProductUpdate::Media(self.media(Field::Value)?),
                };
                Change::UpdateProduct { id, update }
            }
            FormKind::AddPurchaseMethod(product) => Change::AddMethod {
                product,
                method: self.method()?,
            },
            FormKind::EditPurchaseMethod(id) => Change::UpdateMethod {
                id,
                method: self.method()?,
            },
            FormKind::EditSetting => Change::SetSetting {
                key: self.pick(Field::Setting, |v| match v {
                    Value::Setting(key) => Some(*key),
                    _ => None,
                })?,
                value: self.text(Field::Value)?,
            },
            FormKind::ChangeRole => {
                let user = self.pick(Field::Target, |v| match v {
                    Value::User(id) => Some(*id),
                    _ => None,
                })?;
                let action = self.pick(Field::Action, |v| match v {
                    Value::Action(a) => Some(*a),
                    _ => None,
                })?;
                match action {
                    RoleAction::Grant => Change::Grant {
                        user,
                        role: self.pick(Field::Role, |v| match v {
                            Value::Role(r) => Some(*r),
                            _ => None,
                        })?,
                    },
                    RoleAction::Revoke => Change::Revoke { user },
                }
            }
        };
        Ok(change)
    }

    fn pick<T>(&self, field: Field, f: impl Fn(&Value) -> Option<T>) -> Result<T, EngineError> {
        self.fields.get(&field).and_then(f).ok_or_else(|| {
            EngineError::Internal(format!("form {:?} is missing {:?}", self.form, field))
        })
    }

    fn text(&self, field: Field) -> Result<String, EngineError> {
        self.pick(field, |v| match v {
            Value::Text(s) => Some(s.clone()),
            _ => None,
        })
    }

    fn media(&self, field: Field) -> Result<Option<MediaRef>, EngineError> {
        self.pick(field, |v| match v {
            Value::Media(m) => Some(m.clone()),
            _ => None,
        })
    }

    fn method(&self) -> Result<NewMethod, EngineError> {
        Ok(NewMethod {
            kind: self.pick(Field::Payload, |v| match v {
                Value::Payload(p) => Some(p.clone()),
                _ => None,
            })?,
            label: self.text(Field::Label)?,
        })
    }
}
