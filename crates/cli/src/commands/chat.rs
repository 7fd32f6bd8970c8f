//! Interactive REPL over a [`ShoppingAssistant`]. Plain lines go to the
//! assistant; lines starting with `/` are local commands.

use std::io::Write;

use storefront_agent::{CartView, CheckoutView, ConversationMode, ShoppingAssistant};
use storefront_core::config::{AppConfig, LoadOptions};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::commands::CommandResult;

const HELP: &str = "commands: /checkout  /cart  /status  /help  /quit";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChatInput {
    Message(String),
    Checkout,
    Cart,
    Status,
    Help,
    Quit,
    Empty,
    Unknown(String),
}

pub fn parse_input(line: &str) -> ChatInput {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return ChatInput::Empty;
    }

    match trimmed {
        "/checkout" => ChatInput::Checkout,
        "/cart" => ChatInput::Cart,
        "/status" => ChatInput::Status,
        "/help" => ChatInput::Help,
        "/quit" | "/exit" => ChatInput::Quit,
        command if command.starts_with('/') => ChatInput::Unknown(command.to_string()),
        text => ChatInput::Message(text.to_string()),
    }
}

pub fn render_cart(cart: &CartView) -> String {
    if cart.items.is_empty() {
        return "Your cart is empty.".to_string();
    }

    let mut lines: Vec<String> = cart
        .items
        .iter()
        .map(|item| {
            format!("- {} x {} @ ${} = ${}", item.quantity, item.name, item.price, item.line_total())
        })
        .collect();
    lines.push(format!("{} item(s), total ${}", cart.item_count, cart.total));
    lines.join("\n")
}

pub fn render_checkout(view: &CheckoutView) -> String {
    let mode = match view.mode {
        ConversationMode::Shopping => "shopping",
        ConversationMode::Checkout => "checkout",
    };

    let Some(session) = view.session.as_ref() else {
        return format!("mode: {mode}; not signed in");
    };

    let mut lines = vec![
        format!("mode: {mode}; session {} for {}", session.session_id.as_str(), session.user_id.0),
        format!("status: {}; total ${}", session.status.as_str(), session.total_amount),
    ];
    if let Some(method) = session.selected_payment_method.as_ref() {
        lines.push(format!("payment: {} ending {}", method.kind, method.last4));
    }
    if let Some(address) = session.selected_address.as_ref() {
        lines.push(format!(
            "ship to: {}, {}, {} {}",
            address.street, address.city, address.state, address.zip
        ));
    }
    if !view.missing_selections.is_empty() {
        lines.push(format!("still needed: {}", view.missing_selections.join(", ")));
    }
    lines.join("\n")
}

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure("chat", "config_validation", error.to_string(), 2)
        }
    };
    init_logging(&config);

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "chat",
                "runtime",
                format!("failed to initialize async runtime: {error}"),
                1,
            )
        }
    };

    runtime.block_on(converse(&config))
}

async fn converse(config: &AppConfig) -> CommandResult {
    let assistant = match ShoppingAssistant::start(config).await {
        Ok(assistant) => assistant,
        Err(error) => {
            return CommandResult::failure("chat", "backend_startup", error.to_string(), 3)
        }
    };

    println!("Storefront assistant ready. {HELP}");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut exchanged = 0usize;

    loop {
        print!("you> ");
        let _ = std::io::stdout().flush();

        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(error) => {
                assistant.shutdown().await;
                return CommandResult::failure("chat", "stdin", error.to_string(), 1);
            }
        };

        match parse_input(&line) {
            ChatInput::Empty => {}
            ChatInput::Quit => break,
            ChatInput::Help => println!("{HELP}"),
            ChatInput::Unknown(command) => println!("unknown command `{command}`. {HELP}"),
            ChatInput::Cart => println!("{}", render_cart(&assistant.cart().await)),
            ChatInput::Status => println!("{}", render_checkout(&assistant.checkout_status().await)),
            ChatInput::Checkout => {
                let view = assistant.begin_checkout().await;
                println!("{}", render_checkout(&view));
                println!("Checkout mode: tell me your user id or email to sign in.");
            }
            ChatInput::Message(text) => {
                let reply = assistant.send_message(&text).await;
                exchanged += 1;
                println!("assistant> {reply}");
            }
        }
    }

    assistant.shutdown().await;
    CommandResult::success("chat", format!("conversation ended after {exchanged} message(s)"))
}

/// Logs go to stderr so they never interleave with the transcript.
fn init_logging(config: &AppConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("warn,storefront_agent={}", config.logging.level))
    });
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .try_init();
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use storefront_agent::{CartView, CheckoutView, ConversationMode};
    use storefront_core::domain::cart::CartItem;

    use super::{parse_input, render_cart, render_checkout, ChatInput};

    #[test]
    fn slash_commands_are_local() {
        assert_eq!(parse_input(" /cart "), ChatInput::Cart);
        assert_eq!(parse_input("/checkout"), ChatInput::Checkout);
        assert_eq!(parse_input("/exit"), ChatInput::Quit);
        assert_eq!(parse_input("/dance"), ChatInput::Unknown("/dance".to_string()));
        assert_eq!(parse_input("   "), ChatInput::Empty);
        assert_eq!(parse_input("show me shoes"), ChatInput::Message("show me shoes".to_string()));
    }

    #[test]
    fn cart_rendering_lists_lines_and_total() {
        let view = CartView {
            items: vec![CartItem::new("1", "Classic T-Shirt", Decimal::new(1999, 2), 2)],
            item_count: 2,
            total: Decimal::new(3998, 2),
        };

        let rendered = render_cart(&view);
        assert!(rendered.contains("- 2 x Classic T-Shirt @ $19.99 = $39.98"));
        assert!(rendered.ends_with("2 item(s), total $39.98"));

        let empty = CartView { items: Vec::new(), item_count: 0, total: Decimal::ZERO };
        assert_eq!(render_cart(&empty), "Your cart is empty.");
    }

    #[test]
    fn checkout_rendering_without_session() {
        let view = CheckoutView {
            mode: ConversationMode::Checkout,
            status: None,
            session: None,
            missing_selections: Vec::new(),
        };
        assert_eq!(render_checkout(&view), "mode: checkout; not signed in");
    }
}
