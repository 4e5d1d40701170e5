use kiosk_types::models::{PRODUCT_ID_PLACEHOLDER, ProductId, PurchaseKind, PurchaseMethod};

/// What pressing a buy control produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// One external navigation control.
    Link { label: String, url: String },
    /// The staff handle plus the message to send them.
    Contact { handle: String, message: String },
    /// Stored text, verbatim.
    Instruction { text: String },
}

pub fn dispatch(product: ProductId, method: &PurchaseMethod) -> Dispatch {
    match &method.kind {
        PurchaseKind::Link { url } => Dispatch::Link {
            label: method.label.clone(),
            url: url.clone(),
        },
        PurchaseKind::Contact { handle, template } => Dispatch::Contact {
            handle: handle.clone(),
            message: template.replace(PRODUCT_ID_PLACEHOLDER, &product.to_string()),
        },
        PurchaseKind::Instruction { text } => Dispatch::Instruction { text: text.clone() },
    }
}
