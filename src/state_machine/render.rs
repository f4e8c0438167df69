//! Outbound message text

use crate::catalog::CatalogNode;
use crate::db::Order;

pub const WELCOME: &str = "Welcome! 🤖";
pub const AT_MAIN_MENU: &str = "You are at the main menu.";
pub const LOST: &str = "🤔 Sorry, I got a bit lost. Let's start over from the main menu.";
pub const INVALID_CHOICE: &str = "⚠️ *Invalid choice.* Please select a valid number from the list.";
pub const INVALID_CONFIRMATION: &str =
    "⚠️ Invalid input. Please reply with *'1'* to confirm or *'0'* to go back.";
pub const ORDER_FAILED: &str = "🚨 Sorry, there was an error placing your order. Please try again.";
pub const HELP_UNAVAILABLE: &str = "🚨 Sorry, I could not retrieve the help message at this time.";
pub const CONVERSATION_CLOSED: &str = "✅ Conversation closed.\nType menu to return to main menu.";
pub const MESSAGE_RECEIVED: &str = "✅ Message received. (Type 'close' to end)";
pub const STORE_UNAVAILABLE: &str =
    "🚨 Sorry, we couldn't process that right now. Please try again in a moment.";
pub const SOMETHING_WENT_WRONG: &str =
    "🚨 *Oops!* Something went wrong on our end.\nPlease type *menu* to try again.";

const RULE: &str = "--------------------";

pub fn price(currency: &str, amount: f64) -> String {
    format!("{currency}{amount:.2}")
}

/// Numbered list, with prices for orderable entries
pub fn listing(services: &[CatalogNode], currency: &str) -> String {
    services
        .iter()
        .enumerate()
        .map(|(i, node)| match node.orderable_price() {
            Some(p) => format!("{}. {} - {}", i + 1, node.name, price(currency, p)),
            None => format!("{}. {}", i + 1, node.name),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn main_menu(preface: Option<&str>, roots: &[CatalogNode], currency: &str) -> String {
    let body = format!(
        "Here are our main services. Reply with the number of your choice:\n\n{}\n\n{RULE}\n_Type *help* for more options._",
        listing(roots, currency)
    );
    match preface {
        Some(p) => format!("{p}\n\n{body}"),
        None => body,
    }
}

pub fn category_page(title: &str, services: &[CatalogNode], currency: &str, note: Option<&str>) -> String {
    let mut text = format!(
        "*{title}*\n\nSelect an option below:\n\n{}\n\n{RULE}\n_Type *back* to return to the previous menu._",
        listing(services, currency)
    );
    if let Some(note) = note {
        text.push_str("\n\n");
        text.push_str(note);
    }
    text
}

pub fn confirmation(node: &CatalogNode, currency: &str) -> String {
    format!(
        "🛒 *Confirm Your Order*\n\nYou have selected *{}*.\nPrice: *{}*\n\n{RULE}\nReply *'1'* to Confirm\nReply *'0'* to Go Back",
        node.name,
        price(currency, node.price.unwrap_or_default())
    )
}

pub fn no_orderable_under(name: &str) -> String {
    format!("🤷 *No orderable services found under '{name}'.*")
}

pub fn not_orderable(name: &str) -> String {
    format!("❌ Sorry, \"{name}\" cannot be ordered.")
}

pub fn order_confirmed(order: &Order, service_path: &str, currency: &str) -> String {
    format!(
        "✅ *Order Confirmed!*\n\n*Order ID:* {}\n*Service:* {service_path}\n*Price:* {}\n*Status:* Pending\n\nOur team will be in touch shortly. You can reply to this message to add comments to your order.",
        order.id,
        price(currency, order.price)
    )
}

pub fn in_conversation(order_id: &str) -> String {
    format!("You are chatting with us about order {order_id}. Type 'close' to end.")
}

/// Operator message relayed into the customer's chat
pub fn operator_reply(order_id: &str, text: &str) -> String {
    format!(
        "📨 *Reply about order {order_id}*\n\n{text}\n\nReply to this message if you have any questions.\nType 'close' to end this conversation."
    )
}
