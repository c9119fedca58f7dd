use dotenv::dotenv;
use log::info;
use oll_auth::{ActivityKind, MockLatency};
use oll_crm_session::prelude::*;
use std::env;
use std::time::Duration;

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file
    dotenv().ok();
    pretty_env_logger::init();

    let options = SessionOptions::default()
        .with_mock_latency(MockLatency {
            login: Duration::from_millis(300),
            signup: Duration::from_millis(300),
        })
        .with_session_timeout(Duration::from_secs(6))
        .with_sweep_interval(Duration::from_secs(1));

    // AUTH_API_URL selects a remote auth API; otherwise the demo accounts are used.
    let auth = match env::var("AUTH_API_URL") {
        Ok(url) => {
            info!("Using auth API at {}", url);
            OllAuth::with_http_backend(&url, options)?
        }
        Err(_) => OllAuth::with_mock_backend(options),
    };
    let controller = auth.controller();
    let hub = auth.activity_hub().ok_or("auth context has no activity hub")?;

    println!("Starting session example");

    match controller.login("john@example.com", "wrong-password").await {
        Ok(_) => println!("Unexpectedly logged in"),
        Err(err) => println!("Login rejected: {}", err),
    }

    let user = controller.login("john@example.com", "password123").await?;
    println!("Logged in as {} <{}>", user.name, user.email);

    for kind in [ActivityKind::PointerDown, ActivityKind::KeyDown, ActivityKind::Scroll] {
        tokio::time::sleep(Duration::from_secs(2)).await;
        hub.emit(kind);
        println!(
            "{:?} -> {:?} remaining",
            kind,
            auth.session_store().time_remaining()
        );
    }

    println!("\nGoing idle");
    let mut changes = controller.on_state_change();
    while let Ok(state) = changes.recv().await {
        if let Some(error) = state.error {
            println!("{}", error);
            break;
        }
    }

    let user = controller
        .signup("Demo User", "demo@example.com", "demo-password")
        .await?;
    println!("\nSigned up {} ({})", user.name, user.id);

    controller.logout();
    println!("Logged out, authenticated: {}", controller.is_authenticated());

    auth.dispose();
    println!("Session example completed");

    Ok(())
}
