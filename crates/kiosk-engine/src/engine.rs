use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use kiosk_db::{Connection, Database, catalog, purchase as methods, roles, settings};
use kiosk_types::api::Delivery;
use kiosk_types::events::{Choice, Event, FormKind, Nav, RoleAction, Target};
use kiosk_types::models::{
    CategoryId, Entity, MethodId, ProductField, ProductId, ProductUpdate, PurchaseKindTag, Role,
    SettingKey, SubcategoryId, UserId,
};
use tracing::{debug, error, info, warn};

use crate::error::EngineError;
use crate::forms::{self, Answer, Change, ConversationState, Field, Invalid, Offer, Step, Value};
use crate::gate::{self, allowed};
use crate::purchase;
use crate::sessions::Sessions;
use crate::view::{Detail, Notice, Prompt, Reply, Saved, View};

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Idle time after which an open form is discarded.
    pub session_ttl: Duration,
    /// Bot username for the `?start=shop` deep link in group welcomes.
    pub bot_username: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            session_ttl: Duration::from_secs(60 * 60),
            bot_username: None,
        }
    }
}

/// Where to send the user when an event fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fallback {
    Catalog,
    Manage,
}

/// Turns decoded chat events into replies.
///
/// Each call to [`Engine::handle`] holds the caller's conversation slot for
/// its whole duration. Store access runs on the blocking pool so one user's
/// event never stalls another's.
#[derive(Clone)]
pub struct Engine {
    db: Arc<Database>,
    sessions: Arc<Sessions>,
    shop_link: Option<String>,
}

impl Engine {
    pub fn new(db: Arc<Database>, config: EngineConfig) -> Self {
        let shop_link = config
            .bot_username
            .map(|name| format!("https://t.me/{}?start=shop", name.trim_start_matches('@')));
        Self {
            db,
            sessions: Arc::new(Sessions::new(config.session_ttl)),
            shop_link,
        }
    }

    pub fn sessions(&self) -> Arc<Sessions> {
        self.sessions.clone()
    }

    pub fn owner(&self) -> UserId {
        self.db.owner()
    }

    pub async fn handle(&self, user: UserId, event: Event) -> Reply {
        let slot = self.sessions.slot(user).await;
        let mut state = slot.lock().await;

        let mut expired = false;
        if let Some(open) = state.as_ref() {
            if self.sessions.is_expired(open, Utc::now()) {
                debug!("User {}: form {:?} expired", user, open.form);
                *state = None;
                expired = true;
            }
        }

        let (fallback, delivery) = context(&event);
        match self.dispatch(user, &mut state, event, expired).await {
            Ok(reply) => reply,
            Err(e) => self.recover(user, &mut state, e, fallback, delivery).await,
        }
    }

    async fn dispatch(
        &self,
        user: UserId,
        state: &mut Option<ConversationState>,
        event: Event,
        expired: bool,
    ) -> Result<Reply, EngineError> {
        match event {
            Event::Nav(nav) => {
                let left = state.take();
                self.navigate(user, state, nav, left).await
            }
            Event::Text(input) => self.answer(user, state, Answer::Text(input), expired).await,
            Event::Media(media) => self.answer(user, state, Answer::Media(media), expired).await,
            Event::Choice(choice) => {
                self.answer(user, state, Answer::Choice(choice), expired).await
            }
            Event::MembersJoined { humans } => self.group_welcome(humans).await,
        }
    }

    // -- Navigation --

    async fn navigate(
        &self,
        user: UserId,
        state: &mut Option<ConversationState>,
        nav: Nav,
        left: Option<ConversationState>,
    ) -> Result<Reply, EngineError> {
        if let Some(open) = &left {
            if nav == Nav::Cancel {
                info!("User {} cancelled {:?}", user, open.form);
            } else {
                info!("User {} left {:?} for {:?}", user, open.form, nav);
            }
        }

        match nav {
            Nav::Start { arg } => {
                let key = match arg.as_deref() {
                    Some("shop") => SettingKey::ShopGreeting,
                    _ => SettingKey::StartText,
                };
                Ok(Reply::send(self.home(user, key).await?))
            }
            Nav::Home => Ok(Reply::edit(self.home(user, SettingKey::StartText).await?)),
            Nav::Support => {
                let text = self.setting(SettingKey::SupportText).await?;
                Ok(Reply::edit(View::Support { text }))
            }
            Nav::WhoAmI => Ok(Reply::send(View::WhoAmI { user })),
            Nav::Catalog => Ok(Reply::edit(self.catalog().await?)),
            Nav::Category(id) => {
                let (category, subcategories) = self
                    .blocking(move |db| {
                        db.with_snapshot(|conn| {
                            Ok((
                                catalog::get_category(conn, id)?,
                                catalog::list_subcategories(conn, id)?,
                            ))
                        })
                    })
                    .await?;
                Ok(Reply::edit(View::Subcategories {
                    category,
                    subcategories,
                }))
            }
            Nav::Subcategory(id) => {
                let staff = allowed(self.role_of(user).await?, Role::Moderator);
                let (subcategory, products) = self
                    .blocking(move |db| {
                        db.with_snapshot(|conn| {
                            Ok((
                                catalog::get_subcategory(conn, id)?,
                                catalog::list_products(conn, id, staff)?,
                            ))
                        })
                    })
                    .await?;
                Ok(Reply::edit(View::Products {
                    subcategory,
                    products,
                    staff,
                }))
            }
            Nav::Product(id) => self.product_card(user, id).await,
            Nav::Buy { product, method } => self.buy(user, product, method).await,

            Nav::Admin => {
                let role = self.role_of(user).await?;
                gate::require(role, Role::Moderator)?;
                Ok(Reply::edit(View::AdminPanel { role }))
            }
            Nav::ToggleProduct(id) => {
                gate::require(self.role_of(user).await?, Role::Moderator)?;
                let active = self.blocking(move |db| db.toggle_product(id)).await?;
                info!("User {} toggled product {}", user, id);
                let reply = self.product_card(user, id).await?;
                Ok(reply.with_notice(Notice::Toggled { active }))
            }
            Nav::ManageCatalog => {
                gate::require(self.role_of(user).await?, Role::Admin)?;
                Ok(Reply::edit(self.manage_catalog().await?))
            }
            Nav::ManageCategory(id) => {
                gate::require(self.role_of(user).await?, Role::Admin)?;
                Ok(Reply::edit(self.manage_category(id).await?))
            }
            Nav::ManageSubcategory(id) => {
                gate::require(self.role_of(user).await?, Role::Admin)?;
                Ok(Reply::edit(self.manage_subcategory(id).await?))
            }
            Nav::Delete(target) => {
                gate::require(self.role_of(user).await?, Role::Admin)?;
                self.confirm_delete(target).await
            }
            Nav::ConfirmDelete(target) => {
                gate::require(self.role_of(user).await?, Role::Admin)?;
                self.delete(user, target).await
            }
            Nav::Roster => {
                gate::require(self.role_of(user).await?, Role::Owner)?;
                let staff = self.blocking(|db| db.list_staff()).await?;
                Ok(Reply::edit(View::Roster { staff }))
            }

            Nav::Begin(form) => self.begin(user, state, form).await,
            Nav::Cancel => {
                let role = self.role_of(user).await?;
                match left {
                    Some(_) if allowed(role, Role::Moderator) => {
                        Ok(Reply::edit(View::AdminPanel { role }).with_notice(Notice::Cancelled))
                    }
                    Some(_) => Ok(Reply::edit(self.home(user, SettingKey::StartText).await?)
                        .with_notice(Notice::Cancelled)),
                    None => Ok(Reply::edit(self.home(user, SettingKey::StartText).await?)),
                }
            }
        }
    }

    async fn home(&self, user: UserId, key: SettingKey) -> Result<View, EngineError> {
        let (text, role) = self
            .blocking(move |db| Ok((db.setting(key)?, db.role_of(user)?)))
            .await?;
        Ok(View::Home {
            text,
            staff: allowed(role, Role::Moderator),
        })
    }

    async fn catalog(&self) -> Result<View, EngineError> {
        let (prompt, categories) = self
            .blocking(|db| {
                db.with_snapshot(|conn| {
                    Ok((
                        settings::get_setting(conn, SettingKey::CatalogPrompt)?,
                        catalog::list_categories(conn)?,
                    ))
                })
            })
            .await?;
        Ok(View::Categories { prompt, categories })
    }

    async fn product_card(&self, user: UserId, id: ProductId) -> Result<Reply, EngineError> {
        let role = self.role_of(user).await?;
        let (product, methods) = self
            .blocking(move |db| {
                db.with_snapshot(|conn| {
                    Ok((catalog::get_product(conn, id)?, methods::list_methods(conn, id)?))
                })
            })
            .await?;

        if !product.active && !allowed(role, Role::Moderator) {
            debug!("User {} opened inactive product {}", user, id);
            return Ok(Reply::notice(Notice::Unavailable));
        }

        // A text message cannot be edited into a photo or video.
        let delivery = if product.media.is_some() {
            Delivery::Send
        } else {
            Delivery::Edit
        };
        Ok(Reply::edit(View::ProductCard {
            product,
            methods,
            viewer: role,
        })
        .with_delivery(delivery))
    }

    async fn buy(
        &self,
        user: UserId,
        product: ProductId,
        method: MethodId,
    ) -> Result<Reply, EngineError> {
        let role = self.role_of(user).await?;
        let (item, methods) = self
            .blocking(move |db| {
                db.with_snapshot(|conn| {
                    Ok((
                        catalog::get_product(conn, product)?,
                        methods::list_methods(conn, product)?,
                    ))
                })
            })
            .await?;

        if !item.active && !allowed(role, Role::Moderator) {
            return Ok(Reply::notice(Notice::Unavailable));
        }
        if methods.is_empty() {
            return Ok(Reply::notice(Notice::NoPurchase));
        }
        let chosen = methods
            .iter()
            .find(|m| m.id == method)
            .ok_or(EngineError::NotFound(Entity::PurchaseMethod))?;

        debug!("User {} buying product {} via method {}", user, product, method);
        Ok(Reply::send(View::Purchase(purchase::dispatch(product, chosen))))
    }

    async fn group_welcome(&self, humans: u32) -> Result<Reply, EngineError> {
        if humans == 0 {
            return Ok(Reply::send(View::Empty));
        }
        let (text, button) = self
            .blocking(|db| {
                Ok((
                    db.setting(SettingKey::GroupWelcomeText)?,
                    db.setting(SettingKey::GroupWelcomeButton)?,
                ))
            })
            .await?;
        Ok(Reply::send(View::GroupWelcome {
            text,
            button,
            link: self.shop_link.clone(),
        }))
    }

    // -- Catalog management --

    async fn manage_catalog(&self) -> Result<View, EngineError> {
        let categories = self.blocking(|db| db.list_categories()).await?;
        Ok(View::ManageCatalog { categories })
    }

    async fn manage_category(&self, id: CategoryId) -> Result<View, EngineError> {
        let (category, subcategories) = self
            .blocking(move |db| {
                db.with_snapshot(|conn| {
                    Ok((
                        catalog::get_category(conn, id)?,
                        catalog::list_subcategories(conn, id)?,
                    ))
                })
            })
            .await?;
        Ok(View::ManageCategory {
            category,
            subcategories,
        })
    }

    async fn manage_subcategory(&self, id: SubcategoryId) -> Result<View, EngineError> {
        let (subcategory, products) = self
            .blocking(move |db| {
                db.with_snapshot(|conn| {
                    Ok((
                        catalog::get_subcategory(conn, id)?,
                        catalog::list_products(conn, id, true)?,
                    ))
                })
            })
            .await?;
        Ok(View::ManageSubcategory {
            subcategory,
            products,
        })
    }

    async fn confirm_delete(&self, target: Target) -> Result<Reply, EngineError> {
        let (title, back) = self
            .blocking(move |db| {
                db.with_snapshot(|conn| {
                    Ok(match target {
                        Target::Category(id) => {
                            (catalog::get_category(conn, id)?.title, Nav::ManageCategory(id))
                        }
                        Target::Subcategory(id) => (
                            catalog::get_subcategory(conn, id)?.title,
                            Nav::ManageSubcategory(id),
                        ),
                        Target::Product(id) => {
                            (catalog::get_product(conn, id)?.title, Nav::Product(id))
                        }
                        Target::PurchaseMethod(id) => {
                            let method = methods::get_method(conn, id)?;
                            (method.label, Nav::Product(method.product_id))
                        }
                    })
                })
            })
            .await?;
        Ok(Reply::edit(View::ConfirmDelete {
            target,
            title,
            back,
        }))
    }

    /// Deletes `target` (cascading) and shows its parent.
    async fn delete(&self, user: UserId, target: Target) -> Result<Reply, EngineError> {
        let entity = match target {
            Target::Category(_) => Entity::Category,
            Target::Subcategory(_) => Entity::Subcategory,
            Target::Product(_) => Entity::Product,
            Target::PurchaseMethod(_) => Entity::PurchaseMethod,
        };

        let reply = match target {
            Target::Category(id) => {
                self.blocking(move |db| db.with_tx(|conn| catalog::delete_category(conn, id)))
                    .await?;
                Reply::edit(self.manage_catalog().await?)
            }
            Target::Subcategory(id) => {
                let parent = self
                    .blocking(move |db| {
                        db.with_tx(|conn| {
                            let sub = catalog::get_subcategory(conn, id)?;
                            catalog::delete_subcategory(conn, id)?;
                            Ok(sub.category_id)
                        })
                    })
                    .await?;
                Reply::edit(self.manage_category(parent).await?)
            }
            Target::Product(id) => {
                let parent = self
                    .blocking(move |db| {
                        db.with_tx(|conn| {
                            let product = catalog::get_product(conn, id)?;
                            catalog::delete_product(conn, id)?;
                            Ok(product.subcategory_id)
                        })
                    })
                    .await?;
                Reply::edit(self.manage_subcategory(parent).await?)
            }
            Target::PurchaseMethod(id) => {
                let product = self
                    .blocking(move |db| {
                        db.with_tx(|conn| {
                            let method = methods::get_method(conn, id)?;
                            methods::delete_method(conn, id)?;
                            Ok(method.product_id)
                        })
                    })
                    .await?;
                self.product_card(user, product).await?
            }
        };

        info!("User {} deleted {:?}", user, target);
        Ok(reply.with_notice(Notice::Deleted(entity)))
    }

    // -- Forms --

    async fn begin(
        &self,
        user: UserId,
        state: &mut Option<ConversationState>,
        form: FormKind,
    ) -> Result<Reply, EngineError> {
        let role = self.role_of(user).await?;
        if !allowed(role, forms::required_role(form)) {
            warn!("User {} ({}) denied form {:?}", user, role.as_str(), form);
            return Err(EngineError::Unauthorized);
        }

        match form {
            FormKind::RenameCategory(id) => {
                self.blocking(move |db| db.get_category(id)).await?;
            }
            FormKind::RenameSubcategory(id) => {
                self.blocking(move |db| db.get_subcategory(id)).await?;
            }
            FormKind::EditProduct(id) | FormKind::AddPurchaseMethod(id) => {
                self.blocking(move |db| db.get_product(id)).await?;
            }
            FormKind::EditPurchaseMethod(id) => {
                self.blocking(move |db| db.get_method(id)).await?;
            }
            FormKind::AddSubcategory | FormKind::AddProduct => {
                let categories = self.blocking(|db| db.list_categories()).await?;
                if categories.is_empty() {
                    return Ok(
                        Reply::edit(View::AdminPanel { role }).with_notice(Notice::NoCategories)
                    );
                }
            }
            FormKind::AddCategory | FormKind::EditSetting | FormKind::ChangeRole => {}
        }

        let mut open = ConversationState::new(form);
        let notice = self.enter_step(&mut open).await?;
        let prompt = self.prompt(&open).await?;
        info!("User {} started {:?} (session {})", user, form, open.session);
        *state = Some(open);

        Ok(Reply {
            view: View::Prompt(prompt),
            notice,
            delivery: Delivery::Edit,
        })
    }

    async fn answer(
        &self,
        user: UserId,
        state: &mut Option<ConversationState>,
        answer: Answer,
        expired: bool,
    ) -> Result<Reply, EngineError> {
        let delivery = match answer {
            Answer::Choice(_) => Delivery::Edit,
            Answer::Text(_) | Answer::Media(_) => Delivery::Send,
        };

        let Some(open) = state.as_mut() else {
            if expired {
                let home = self.home(user, SettingKey::StartText).await?;
                return Ok(Reply::send(home).with_notice(Notice::Expired));
            }
            return Ok(match answer {
                Answer::Choice(_) => Reply::notice(Notice::Invalid(Invalid::StaleChoice)),
                // Stray chat text outside a form.
                Answer::Text(_) | Answer::Media(_) => Reply::send(View::Empty),
            });
        };

        let role = self.role_of(user).await?;
        if !allowed(role, forms::required_role(open.form)) {
            warn!("User {} lost access during {:?}", user, open.form);
            *state = None;
            return Err(EngineError::Unauthorized);
        }

        open.touched_at = Utc::now();
        match open.accept(answer, self.owner()) {
            Err(invalid) => {
                debug!("User {} at {:?}: {}", user, open.step, invalid);
                let prompt = self.prompt(open).await?;
                Ok(Reply {
                    view: View::Prompt(prompt),
                    notice: Some(Notice::Invalid(invalid)),
                    delivery,
                })
            }
            Ok(Some(step)) => {
                debug!("User {} advanced to {:?}", user, step);
                let notice = self.enter_step(open).await?;
                let prompt = self.prompt(open).await?;
                Ok(Reply {
                    view: View::Prompt(prompt),
                    notice,
                    delivery,
                })
            }
            Ok(None) => self.commit(user, state, delivery).await,
        }
    }

    /// Loads the options of the step `open` has just moved to.
    async fn enter_step(&self, open: &mut ConversationState) -> Result<Option<Notice>, EngineError> {
        let mut notice = None;
        let options = match open.step {
            Step::SubcategoryParent | Step::ProductCategory => self.category_offers().await?,
            Step::ProductSubcategory => {
                let category = match open.fields.get(&Field::Category) {
                    Some(Value::Category(id)) => *id,
                    _ => {
                        return Err(EngineError::Internal(
                            "subcategory step without a category".into(),
                        ));
                    }
                };
                let subs = self.blocking(move |db| db.list_subcategories(category)).await?;
                if subs.is_empty() {
                    // Nothing to pick: go back to the category choice.
                    open.step = Step::ProductCategory;
                    open.fields.remove(&Field::Category);
                    notice = Some(Notice::NoSubcategories);
                    self.category_offers().await?
                } else {
                    subs.into_iter()
                        .map(|s| Offer::titled(Choice::Subcategory(s.id), s.title))
                        .collect()
                }
            }
            Step::ProductKind | Step::MethodKind => {
                PurchaseKindTag::ALL.into_iter().map(|k| Offer::plain(Choice::Kind(k))).collect()
            }
            Step::EditField => ProductField::ALL
                .into_iter()
                .map(|f| Offer::plain(Choice::Field(f)))
                .collect(),
            Step::SettingPick => SettingKey::ALL
                .into_iter()
                .map(|k| Offer::plain(Choice::Setting(k)))
                .collect(),
            Step::RoleAction => [RoleAction::Grant, RoleAction::Revoke]
                .into_iter()
                .map(|a| Offer::plain(Choice::Action(a)))
                .collect(),
            Step::RoleGrant => Role::GRANTABLE
                .into_iter()
                .map(|r| Offer::plain(Choice::Role(r)))
                .collect(),
            _ => Vec::new(),
        };
        open.options = options;
        Ok(notice)
    }

    async fn category_offers(&self) -> Result<Vec<Offer>, EngineError> {
        let categories = self.blocking(|db| db.list_categories()).await?;
        Ok(categories
            .into_iter()
            .map(|c| Offer::titled(Choice::Category(c.id), c.title))
            .collect())
    }

    async fn prompt(&self, open: &ConversationState) -> Result<Prompt, EngineError> {
        let detail = match (open.step, open.expect()) {
            (_, forms::Expect::Payload(kind)) => Some(Detail::Kind(kind)),
            (Step::EditValue, _) => match open.fields.get(&Field::ProductField) {
                Some(Value::ProductField(field)) => Some(Detail::Field(*field)),
                _ => None,
            },
            (Step::SettingValue, _) => match open.fields.get(&Field::Setting) {
                Some(Value::Setting(key)) => {
                    let key = *key;
                    let current = self.setting(key).await?;
                    Some(Detail::Setting { key, current })
                }
                _ => None,
            },
            _ => None,
        };
        Ok(Prompt {
            form: open.form,
            step: open.step,
            detail,
            options: open.options.clone(),
        })
    }

    async fn commit(
        &self,
        user: UserId,
        state: &mut Option<ConversationState>,
        delivery: Delivery,
    ) -> Result<Reply, EngineError> {
        let Some(open) = state.as_ref() else {
            return Err(EngineError::Internal("commit without an open form".into()));
        };
        let change = open.change()?;
        let session = open.session;
        let form = open.form;
        let owner = self.owner();

        let result = {
            let change = change.clone();
            self.blocking(move |db| db.commit_form(session, |conn| apply(conn, owner, &change)))
                .await
        };

        match result {
            Ok(()) => {
                *state = None;
                info!("User {} committed {:?} (session {})", user, form, session);
                let (view, saved) = self.after_commit(user, change).await?;
                Ok(Reply {
                    view,
                    notice: Some(Notice::Saved(saved)),
                    delivery,
                })
            }
            Err(EngineError::AlreadyCommitted) => {
                *state = None;
                info!("User {}: session {} already committed", user, session);
                let role = self.role_of(user).await?;
                Ok(Reply {
                    view: View::AdminPanel { role },
                    notice: Some(Notice::AlreadySaved),
                    delivery,
                })
            }
            Err(EngineError::InvalidInput(invalid)) => {
                // Rejected by the store: stay on the final step.
                let prompt = match state.as_ref() {
                    Some(open) => self.prompt(open).await?,
                    None => return Err(EngineError::InvalidInput(invalid)),
                };
                Ok(Reply {
                    view: View::Prompt(prompt),
                    notice: Some(Notice::Invalid(invalid)),
                    delivery,
                })
            }
            Err(e) => {
                *state = None;
                Err(e)
            }
        }
    }

    /// The screen shown after a successful commit.
    async fn after_commit(&self, user: UserId, change: Change) -> Result<(View, Saved), EngineError> {
        let role = self.role_of(user).await?;
        let panel = View::AdminPanel { role };
        Ok(match change {
            Change::AddCategory { title } => (panel, Saved::CategoryAdded(title)),
            Change::AddSubcategory { title, .. } => (panel, Saved::SubcategoryAdded(title)),
            Change::AddProduct { product, .. } => (panel, Saved::ProductAdded(product.title)),
            Change::RenameCategory { id, title } => {
                (self.manage_category(id).await?, Saved::Renamed(title))
            }
            Change::RenameSubcategory { id, title } => {
                (self.manage_subcategory(id).await?, Saved::Renamed(title))
            }
            Change::UpdateProduct { id, update } => {
                let field = match update {
                    ProductUpdate::Title(_) => ProductField::Title,
                    ProductUpdate::Price(_) => ProductField::Price,
                    ProductUpdate::Description(_) => ProductField::Description,
                    ProductUpdate::Media(_) => ProductField::Media,
                };
                (self.card_view(user, id).await?, Saved::ProductUpdated(field))
            }
            Change::AddMethod { product, .. } => {
                (self.card_view(user, product).await?, Saved::MethodSaved)
            }
            Change::UpdateMethod { id, .. } => {
                let product = self.blocking(move |db| db.get_method(id)).await?.product_id;
                (self.card_view(user, product).await?, Saved::MethodSaved)
            }
            Change::SetSetting { key, .. } => (panel, Saved::SettingSaved(key)),
            Change::Grant { user: target, role: granted } => {
                let staff = self.blocking(|db| db.list_staff()).await?;
                (View::Roster { staff }, Saved::RoleGranted(target, granted))
            }
            Change::Revoke { user: target } => {
                let staff = self.blocking(|db| db.list_staff()).await?;
                (View::Roster { staff }, Saved::RoleRevoked(target))
            }
        })
    }

    async fn card_view(&self, user: UserId, id: ProductId) -> Result<View, EngineError> {
        Ok(self.product_card(user, id).await?.view)
    }

    // -- Error recovery --

    /// Converts a failure into a reply that leaves the user somewhere
    /// navigable. Any open form is discarded unless the input was merely
    /// invalid.
    async fn recover(
        &self,
        user: UserId,
        state: &mut Option<ConversationState>,
        err: EngineError,
        fallback: Fallback,
        delivery: Delivery,
    ) -> Reply {
        let notice = match err {
            EngineError::Unauthorized => {
                warn!("User {}: unauthorized", user);
                *state = None;
                return Reply::notice(Notice::Unauthorized).with_delivery(delivery);
            }
            EngineError::InvalidInput(invalid) => {
                return Reply::notice(Notice::Invalid(invalid)).with_delivery(delivery);
            }
            EngineError::AlreadyCommitted => {
                *state = None;
                return Reply::notice(Notice::AlreadySaved).with_delivery(delivery);
            }
            EngineError::NotFound(entity) => {
                debug!("User {}: {} not found", user, entity);
                Notice::NotFound(entity)
            }
            EngineError::ReferentialViolation(entity) => {
                error!("User {}: write referenced a missing {}", user, entity);
                Notice::Failed
            }
            EngineError::Internal(msg) => {
                error!("User {}: {}", user, msg);
                Notice::Failed
            }
        };

        *state = None;
        match self.safe_view(user, fallback).await {
            Ok(view) => Reply {
                view,
                notice: Some(notice),
                delivery,
            },
            Err(e) => {
                error!("User {}: fallback view failed: {}", user, e);
                Reply::notice(notice).with_delivery(delivery)
            }
        }
    }

    async fn safe_view(&self, user: UserId, fallback: Fallback) -> Result<View, EngineError> {
        if fallback == Fallback::Manage && allowed(self.role_of(user).await?, Role::Admin) {
            return self.manage_catalog().await;
        }
        self.catalog().await
    }

    // -- Store access --

    async fn role_of(&self, user: UserId) -> Result<Role, EngineError> {
        self.blocking(move |db| db.role_of(user)).await
    }

    async fn setting(&self, key: SettingKey) -> Result<String, EngineError> {
        self.blocking(move |db| db.setting(key)).await
    }

    async fn blocking<F, T>(&self, f: F) -> Result<T, EngineError>
    where
        F: FnOnce(&Database) -> kiosk_db::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                EngineError::Internal(e.to_string())
            })?
            .map_err(EngineError::from)
    }
}

/// Applies a completed form inside the commit transaction.
fn apply(conn: &Connection, owner: UserId, change: &Change) -> kiosk_db::Result<()> {
    match change {
        Change::AddCategory { title } => catalog::insert_category(conn, title).map(drop),
        Change::AddSubcategory { category, title } => {
            catalog::insert_subcategory(conn, *category, title).map(drop)
        }
        Change::AddProduct { product, method } => {
            let id = catalog::insert_product(conn, product)?;
            methods::insert_method(conn, id, method)?;
            Ok(())
        }
        Change::RenameCategory { id, title } => catalog::rename_category(conn, *id, title),
        Change::RenameSubcategory { id, title } => catalog::rename_subcategory(conn, *id, title),
        Change::UpdateProduct { id, update } => catalog::update_product(conn, *id, update),
        Change::AddMethod { product, method } => {
            methods::insert_method(conn, *product, method).map(drop)
        }
        Change::UpdateMethod { id, method } => methods::update_method(conn, *id, method),
        Change::SetSetting { key, value } => settings::set_setting(conn, *key, value),
        Change::Grant { user, role } => roles::grant_role(conn, owner, *user, *role),
        Change::Revoke { user } => roles::revoke_role(conn, owner, *user),
    }
}

/// Fallback screen and delivery for an event that fails.
fn context(event: &Event) -> (Fallback, Delivery) {
    match event {
        Event::Nav(Nav::Start { .. } | Nav::WhoAmI) => (Fallback::Catalog, Delivery::Send),
        Event::Nav(
            Nav::Admin
            | Nav::ToggleProduct(_)
            | Nav::ManageCatalog
            | Nav::ManageCategory(_)
            | Nav::ManageSubcategory(_)
            | Nav::Delete(_)
            | Nav::ConfirmDelete(_)
            | Nav::Roster
            | Nav::Begin(_)
            | Nav::Cancel,
        ) => (Fallback::Manage, Delivery::Edit),
        Event::Nav(_) => (Fallback::Catalog, Delivery::Edit),
        Event::Choice(_) => (Fallback::Manage, Delivery::Edit),
        Event::Text(_) | Event::Media(_) => (Fallback::Manage, Delivery::Send),
        Event::MembersJoined { .. } => (Fallback::Catalog, Delivery::Send),
    }
}
