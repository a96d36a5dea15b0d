use anyhow::Result;

use crate::context::App;

pub async fn run_relays(app: &App) -> Result<()> {
    for relay in app.user_relays().await? {
        let marker = match (relay.read, relay.write) {
            (true, true) => "read+write",
            (true, false) => "read",
            (false, true) => "write",
            (false, false) => "unused",
        };
        println!("{:<10} {}", marker, relay.url);
    }
    Ok(())
}
