//! Default English rendering of engine replies into transport instructions.

use kiosk_types::api::{Ack, Control, Delivery, RenderInstruction};
use kiosk_types::events::{Choice, Event, FormKind, Nav, RoleAction, Target};
use kiosk_types::models::{
    DEFAULT_BUY_LABEL, Entity, Product, ProductField, PurchaseKindTag, Role, SettingKey,
};

use crate::forms::{Offer, Step};
use crate::gate::allowed;
use crate::purchase::Dispatch;
use crate::view::{Detail, Notice, Prompt, Reply, Saved, View};

pub fn render(reply: &Reply) -> RenderInstruction {
    let mut text = view_text(&reply.view);
    let ack = reply.notice.as_ref().map(|notice| Ack {
        text: notice_text(notice),
        alert: is_alert(notice),
    });

    // Acks only reach button presses; typed input gets the notice inline.
    if reply.delivery == Delivery::Send {
        if let Some(ack) = &ack {
            text = Some(match text {
                Some(body) => format!("{}\n\n{}", ack.text, body),
                None => ack.text.clone(),
            });
        }
    }

    let media = match &reply.view {
        View::ProductCard { product, .. } => product.media.clone(),
        _ => None,
    };

    RenderInstruction {
        delivery: reply.delivery,
        text,
        media,
        controls: controls(&reply.view),
        ack,
    }
}

fn nav(label: impl Into<String>, to: Nav) -> Control {
    Control::event(label, Event::Nav(to))
}

fn row(control: Control) -> Vec<Control> {
    vec![control]
}

fn back(to: Nav) -> Vec<Control> {
    row(nav("Back", to))
}

fn view_text(view: &View) -> Option<String> {
    let text = match view {
        View::Empty => return None,
        View::Home { text, .. } | View::Support { text } => text.clone(),
        View::WhoAmI { user } => format!("Your user id: {}", user),
        View::GroupWelcome { text, .. } => text.clone(),
        View::Categories { prompt, categories } => {
            if categories.is_empty() {
                "The catalog is empty for now.".to_string()
            } else {
                prompt.clone()
            }
        }
        View::Subcategories {
            category,
            subcategories,
        } => {
            if subcategories.is_empty() {
                format!("{}\nNothing here yet.", category.title)
            } else {
                format!("{}\nPick a subcategory:", category.title)
            }
        }
        View::Products {
            subcategory,
            products,
            ..
        } => {
            if products.is_empty() {
                format!("{}\nNo products yet.", subcategory.title)
            } else {
                format!("{}\nProducts:", subcategory.title)
            }
        }
        View::ProductCard {
            product,
            methods,
            viewer,
        } => {
            let mut text = product.title.clone();
            if !product.active && allowed(*viewer, Role::Moderator) {
                text.push_str(" (inactive)");
            }
            if !product.price.is_empty() {
                text.push_str(&format!("\nPrice: {}", product.price));
            }
            if !product.description.is_empty() {
                text.push_str(&format!("\n\n{}", product.description));
            }
            if methods.is_empty() {
                text.push_str("\n\nNo purchase method is configured yet.");
            }
            text
        }
        View::Purchase(dispatch) => match dispatch {
            Dispatch::Link { .. } => "Tap the button to buy:".to_string(),
            Dispatch::Contact { handle, message } => {
                format!("Write to the manager: @{}\n\nMessage:\n{}", handle, message)
            }
            Dispatch::Instruction { text } => text.clone(),
        },
        View::AdminPanel { .. } => "Admin panel:".to_string(),
        View::ManageCatalog { categories } => {
            if categories.is_empty() {
                "Catalog editing. There are no categories yet.".to_string()
            } else {
                "Catalog editing. Pick a category:".to_string()
            }
        }
        View::ManageCategory { category, .. } => format!("Category: {}", category.title),
        View::ManageSubcategory { subcategory, .. } => {
            format!("Subcategory: {}", subcategory.title)
        }
        View::ConfirmDelete { target, title, .. } => match target {
            Target::Category(_) => format!(
                "Delete category \"{}\" with all its subcategories and products?",
                title
            ),
            Target::Subcategory(_) => {
                format!("Delete subcategory \"{}\" with all its products?", title)
            }
            Target::Product(_) => format!("Delete product \"{}\"?", title),
            Target::PurchaseMethod(_) => format!("Delete purchase method \"{}\"?", title),
        },
        View::Roster { staff } => {
            let mut text = String::from("Staff:");
            for entry in staff {
                text.push_str(&format!("\n{}: {}", entry.user_id, entry.role.as_str()));
            }
            text
        }
        View::Prompt(prompt) => prompt_text(prompt),
    };
    Some(text)
}

fn controls(view: &View) -> Vec<Vec<Control>> {
    match view {
        View::Empty | View::WhoAmI { .. } => Vec::new(),
        View::Home { staff, .. } => {
            let mut rows = vec![row(nav("Catalog", Nav::Catalog)), row(nav("Support", Nav::Support))];
            if *staff {
                rows.push(row(nav("Admin panel", Nav::Admin)));
            }
            rows
        }
        View::Support { .. } => vec![back(Nav::Home)],
        View::GroupWelcome { button, link, .. } => match link {
            Some(url) => vec![row(Control::url(button.clone(), url.clone()))],
            None => Vec::new(),
        },
        View::Categories { categories, .. } => {
            let mut rows: Vec<_> = categories
                .iter()
                .map(|c| row(nav(c.title.clone(), Nav::Category(c.id))))
                .collect();
            rows.push(row(nav("Menu", Nav::Home)));
            rows
        }
        View::Subcategories {
            subcategories,
            ..
        } => {
            let mut rows: Vec<_> = subcategories
                .iter()
                .map(|s| row(nav(s.title.clone(), Nav::Subcategory(s.id))))
                .collect();
            rows.push(back(Nav::Catalog));
            rows
        }
        View::Products {
            subcategory,
            products,
            staff,
        } => {
            let mut rows: Vec<_> = products
                .iter()
                .map(|p| row(nav(product_label(p, *staff), Nav::Product(p.id))))
                .collect();
            rows.push(back(Nav::Category(subcategory.category_id)));
            rows
        }
        View::ProductCard {
            product,
            methods,
            viewer,
        } => {
            let mut rows: Vec<_> = methods
                .iter()
                .map(|m| {
                    row(nav(
                        m.label.clone(),
                        Nav::Buy {
                            product: product.id,
                            method: m.id,
                        },
                    ))
                })
                .collect();
            if allowed(*viewer, Role::Moderator) {
                let label = if product.active { "Deactivate" } else { "Activate" };
                rows.push(row(nav(label, Nav::ToggleProduct(product.id))));
            }
            if allowed(*viewer, Role::Admin) {
                rows.push(row(nav("Edit product", Nav::Begin(FormKind::EditProduct(product.id)))));
                rows.push(row(nav(
                    "Add purchase method",
                    Nav::Begin(FormKind::AddPurchaseMethod(product.id)),
                )));
                for m in methods {
                    rows.push(vec![
                        nav(
                            format!("Edit \"{}\"", m.label),
                            Nav::Begin(FormKind::EditPurchaseMethod(m.id)),
                        ),
                        nav(
                            format!("Delete \"{}\"", m.label),
                            Nav::Delete(Target::PurchaseMethod(m.id)),
                        ),
                    ]);
                }
                rows.push(row(nav("Delete product", Nav::Delete(Target::Product(product.id)))));
            }
            rows.push(back(Nav::Subcategory(product.subcategory_id)));
            rows
        }
        View::Purchase(dispatch) => match dispatch {
            Dispatch::Link { label, url } => vec![row(Control::url(label.clone(), url.clone()))],
            Dispatch::Contact { .. } | Dispatch::Instruction { .. } => Vec::new(),
        },
        View::AdminPanel { role } => {
            let mut rows = Vec::new();
            if allowed(*role, Role::Admin) {
                rows.push(row(nav("Add category", Nav::Begin(FormKind::AddCategory))));
                rows.push(row(nav("Add subcategory", Nav::Begin(FormKind::AddSubcategory))));
                rows.push(row(nav("Add product", Nav::Begin(FormKind::AddProduct))));
                rows.push(row(nav("Edit catalog", Nav::ManageCatalog)));
                rows.push(row(nav("Texts", Nav::Begin(FormKind::EditSetting))));
            }
            if allowed(*role, Role::Owner) {
                rows.push(row(nav("Roles", Nav::Roster)));
            }
            rows.push(row(nav("Menu", Nav::Home)));
            rows
        }
        View::ManageCatalog { categories } => {
            let mut rows: Vec<_> = categories
                .iter()
                .map(|c| row(nav(c.title.clone(), Nav::ManageCategory(c.id))))
                .collect();
            rows.push(back(Nav::Admin));
            rows
        }
        View::ManageCategory {
            category,
            subcategories,
        } => {
            let mut rows: Vec<_> = subcategories
                .iter()
                .map(|s| row(nav(s.title.clone(), Nav::ManageSubcategory(s.id))))
                .collect();
            rows.push(row(nav("Rename", Nav::Begin(FormKind::RenameCategory(category.id)))));
            rows.push(row(nav("Delete", Nav::Delete(Target::Category(category.id)))));
            rows.push(back(Nav::ManageCatalog));
            rows
        }
        View::ManageSubcategory {
            subcategory,
            products,
        } => {
            let mut rows: Vec<_> = products
                .iter()
                .map(|p| row(nav(product_label(p, true), Nav::Product(p.id))))
                .collect();
            rows.push(row(nav("Rename", Nav::Begin(FormKind::RenameSubcategory(subcategory.id)))));
            rows.push(row(nav("Delete", Nav::Delete(Target::Subcategory(subcategory.id)))));
            rows.push(back(Nav::ManageCategory(subcategory.category_id)));
            rows
        }
        View::ConfirmDelete { target, back, .. } => vec![
            row(nav("Yes, delete", Nav::ConfirmDelete(*target))),
            row(nav("No", back.clone())),
        ],
        View::Roster { .. } => vec![
            row(nav("Grant or revoke a role", Nav::Begin(FormKind::ChangeRole))),
            back(Nav::Admin),
        ],
        View::Prompt(prompt) => {
            let mut rows: Vec<_> = prompt
                .options
                .iter()
                .map(|offer| {
                    row(Control::event(
                        offer_label(offer),
                        Event::Choice(offer.choice.clone()),
                    ))
                })
                .collect();
            rows.push(row(nav("Cancel", Nav::Cancel)));
            rows
        }
    }
}

fn product_label(product: &Product, staff: bool) -> String {
    let mut label = product.title.clone();
    if !product.price.is_empty() {
        label.push_str(&format!(" ({})", product.price));
    }
    if staff && !product.active {
        label = format!("[off] {}", label);
    }
    label
}

fn offer_label(offer: &Offer) -> String {
    if let Some(title) = &offer.title {
        return title.clone();
    }
    match &offer.choice {
        Choice::Category(id) => format!("Category #{}", id),
        Choice::Subcategory(id) => format!("Subcategory #{}", id),
        Choice::Field(field) => field_name(*field).to_string(),
        Choice::Kind(kind) => match kind {
            PurchaseKindTag::Link => "Link",
            PurchaseKindTag::Contact => "Contact a manager",
            PurchaseKindTag::Instruction => "Instruction text",
        }
        .to_string(),
        Choice::Setting(key) => setting_name(*key).to_string(),
        Choice::Action(action) => match action {
            RoleAction::Grant => "Grant",
            RoleAction::Revoke => "Revoke",
        }
        .to_string(),
        Choice::Role(role) => match role {
            Role::Admin => "Admin",
            Role::Moderator => "Moderator",
            Role::Owner => "Owner",
            Role::User => "User",
        }
        .to_string(),
    }
}

fn field_name(field: ProductField) -> &'static str {
    match field {
        ProductField::Title => "Title",
        ProductField::Price => "Price",
        ProductField::Description => "Description",
        ProductField::Media => "Photo or video",
    }
}

fn setting_name(key: SettingKey) -> &'static str {
    match key {
        SettingKey::StartText => "Start greeting",
        SettingKey::SupportText => "Support",
        SettingKey::GroupWelcomeText => "Group welcome",
        SettingKey::GroupWelcomeButton => "Group welcome button",
        SettingKey::ShopGreeting => "Shop greeting",
        SettingKey::CatalogPrompt => "Catalog prompt",
    }
}

fn prompt_text(prompt: &Prompt) -> String {
    match prompt.step {
        Step::CategoryTitle => "Send the new category title:".into(),
        Step::SubcategoryParent => "Pick the category for the new subcategory:".into(),
        Step::SubcategoryTitle => "Send the subcategory title:".into(),
        Step::ProductCategory => "Pick the product's category:".into(),
        Step::ProductSubcategory => "Pick the subcategory:".into(),
        Step::ProductTitle => "Send the product title:".into(),
        Step::ProductPrice => "Send the price, or - to show no price:".into(),
        Step::ProductDescription => "Send the description, or - to leave it empty:".into(),
        Step::ProductMedia => "Send a photo or a video, or - for none:".into(),
        Step::ProductKind | Step::MethodKind => "How should customers buy it?".into(),
        Step::ProductPayload | Step::MethodPayload => match prompt.detail {
            Some(Detail::Kind(PurchaseKindTag::Contact)) => {
                "Send the manager's username, for example @manager:".into()
            }
            Some(Detail::Kind(PurchaseKindTag::Instruction)) => {
                "Send the purchase instructions:".into()
            }
            _ => "Send the purchase link (https://, http:// or tg://):".into(),
        },
        Step::ProductLabel | Step::MethodLabel => {
            format!("Send the button label, or - for \"{}\":", DEFAULT_BUY_LABEL)
        }
        Step::CategoryRename => "Send the new category title:".into(),
        Step::SubcategoryRename => "Send the new subcategory title:".into(),
        Step::EditField => "What do you want to change?".into(),
        Step::EditValue => match prompt.detail {
            Some(Detail::Field(ProductField::Price)) => {
                "Send the new price, or - to hide it:".into()
            }
            Some(Detail::Field(ProductField::Description)) => {
                "Send the new description, or - to clear it:".into()
            }
            Some(Detail::Field(ProductField::Media)) => {
                "Send a new photo or video, or - to remove it:".into()
            }
            _ => "Send the new title:".into(),
        },
        Step::SettingPick => "Which text do you want to edit?".into(),
        Step::SettingValue => match &prompt.detail {
            Some(Detail::Setting { key, current }) => format!(
                "{}. Current value:\n{}\n\nSend the new text, or - to clear it:",
                setting_name(*key),
                current
            ),
            _ => "Send the new text, or - to clear it:".into(),
        },
        Step::RoleAction => "Grant or revoke a role?".into(),
        Step::RoleTarget => "Send the user's numeric id (they can get it with /id):".into(),
        Step::RoleGrant => "Which role?".into(),
    }
}

fn entity_name(entity: Entity) -> String {
    entity.to_string()
}

pub fn notice_text(notice: &Notice) -> String {
    match notice {
        Notice::Unauthorized => "No access.".into(),
        Notice::Invalid(invalid) => format!("Not accepted: {}. Try again.", invalid),
        Notice::NotFound(entity) => format!("That {} no longer exists.", entity_name(*entity)),
        Notice::Unavailable => "This product is unavailable.".into(),
        Notice::NoPurchase => "No purchase method is configured for this product.".into(),
        Notice::NoCategories => "Create a category first.".into(),
        Notice::NoSubcategories => {
            "That category has no subcategories yet. Pick another one.".into()
        }
        Notice::Saved(saved) => match saved {
            Saved::CategoryAdded(title) => format!("Category added: {}", title),
            Saved::SubcategoryAdded(title) => format!("Subcategory added: {}", title),
            Saved::ProductAdded(title) => format!("Product added: {}", title),
            Saved::Renamed(title) => format!("Renamed to {}", title),
            Saved::ProductUpdated(field) => {
                format!("{} updated", field_name(*field))
            }
            Saved::MethodSaved => "Purchase method saved".into(),
            Saved::SettingSaved(key) => format!("Text \"{}\" saved", setting_name(*key)),
            Saved::RoleGranted(user, role) => format!("User {} is now {}", user, role.as_str()),
            Saved::RoleRevoked(user) => format!("User {} is now a regular user", user),
        },
        Notice::AlreadySaved => "Already saved.".into(),
        Notice::Cancelled => "Cancelled.".into(),
        Notice::Expired => "That form expired. Start again from the menu.".into(),
        Notice::Deleted(entity) => format!("Deleted the {}.", entity_name(*entity)),
        Notice::Toggled { active } => {
            if *active {
                "Product is visible again.".into()
            } else {
                "Product is hidden from customers.".into()
            }
        }
        Notice::Failed => "Something went wrong. Please try again.".into(),
    }
}

fn is_alert(notice: &Notice) -> bool {
    matches!(
        notice,
        Notice::Unauthorized
            | Notice::NotFound(_)
            | Notice::Unavailable
            | Notice::NoPurchase
            | Notice::NoCategories
            | Notice::NoSubcategories
            | Notice::Expired
            | Notice::Failed
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiosk_types::api::ControlAction;
    use kiosk_types::models::{
        MethodId, ProductId, PurchaseKind, PurchaseMethod, SubcategoryId,
    };

    fn product(active: bool) -> Product {
        Product {
            id: ProductId(3),
            subcategory_id: SubcategoryId(2),
            title: "Cola".into(),
            price: "2".into(),
            description: String::new(),
            media: None,
            active,
            sort: 0,
        }
    }

    fn card(viewer: Role) -> Reply {
        Reply::edit(View::ProductCard {
            product: product(true),
            methods: vec![PurchaseMethod {
                id: MethodId(8),
                product_id: ProductId(3),
                kind: PurchaseKind::Link {
                    url: "https://example.com/buy".into(),
                },
                label: "Buy".into(),
                sort: 0,
            }],
            viewer,
        })
    }

    fn targets(instruction: &RenderInstruction) -> Vec<Nav> {
        instruction
            .controls
            .iter()
            .flatten()
            .filter_map(|c| match &c.action {
                ControlAction::Event {
                    event: Event::Nav(nav),
                } => Some(nav.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn product_card_controls_depend_on_role() {
        let user = targets(&render(&card(Role::User)));
        assert_eq!(
            user,
            vec![
                Nav::Buy {
                    product: ProductId(3),
                    method: MethodId(8)
                },
                Nav::Subcategory(SubcategoryId(2)),
            ]
        );

        let moderator = targets(&render(&card(Role::Moderator)));
        assert!(moderator.contains(&Nav::ToggleProduct(ProductId(3))));
        assert!(!moderator.contains(&Nav::Delete(Target::Product(ProductId(3)))));

        let admin = targets(&render(&card(Role::Admin)));
        assert!(admin.contains(&Nav::Begin(FormKind::EditProduct(ProductId(3)))));
        assert!(admin.contains(&Nav::Delete(Target::PurchaseMethod(MethodId(8)))));
        assert!(admin.contains(&Nav::Delete(Target::Product(ProductId(3)))));
    }

    #[test]
    fn admin_panel_controls_depend_on_role() {
        let panel = |role| targets(&render(&Reply::edit(View::AdminPanel { role })));

        assert_eq!(panel(Role::Moderator), vec![Nav::Home]);

        let admin = panel(Role::Admin);
        assert!(admin.contains(&Nav::Begin(FormKind::AddCategory)));
        assert!(admin.contains(&Nav::ManageCatalog));
        assert!(!admin.contains(&Nav::Roster));

        let owner = panel(Role::Owner);
        assert!(owner.contains(&Nav::Begin(FormKind::EditSetting)));
        assert!(owner.contains(&Nav::Roster));
    }

    #[test]
    fn typed_input_gets_notice_inline() {
        let reply = Reply::send(View::Support {
            text: "Call us".into(),
        })
        .with_notice(Notice::Cancelled);
        let out = render(&reply);
        assert_eq!(out.text.as_deref(), Some("Cancelled.\n\nCall us"));
        assert!(!out.ack.unwrap().alert);

        let edited = render(&Reply::notice(Notice::Unauthorized));
        assert_eq!(edited.text, None);
        assert!(edited.ack.unwrap().alert);
    }

    #[test]
    fn prompts_always_offer_cancel() {
        let reply = Reply::edit(View::Prompt(Prompt {
            form: FormKind::AddCategory,
            step: Step::CategoryTitle,
            detail: None,
            options: Vec::new(),
        }));
        assert_eq!(targets(&render(&reply)), vec![Nav::Cancel]);
    }

    #[test]
    fn contact_dispatch_renders_handle_with_at() {
        let reply = Reply::send(View::Purchase(Dispatch::Contact {
            handle: "manager".into(),
            message: "Hello! I would like to buy product #3.".into(),
        }));
        let text = render(&reply).text.unwrap();
        assert!(text.contains("@manager"));
        assert!(text.contains("product #3"));
    }

    #[test]
    fn inactive_products_are_marked_for_staff_only() {
        assert_eq!(product_label(&product(false), true), "[off] Cola (2)");
        assert_eq!(product_label(&product(false), false), "Cola (2)");
    }
}
