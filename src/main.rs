use subtrack::App;
use subtrack::config::BackendConfig;
use subtrack::services::guard::Navigation;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt::init();

    let config = BackendConfig::from_env();
    let app = match App::new(&config) {
        Ok(app) => app,
        Err(e) => {
            tracing::error!(error = %e, "backend client init failed");
            std::process::exit(1);
        }
    };

    // Optional password sign-in for headless use.
    if let (Ok(email), Ok(password)) = (std::env::var("SUBTRACK_EMAIL"), std::env::var("SUBTRACK_PASSWORD")) {
        if app.auth.sign_in(&email, &password).await.is_err() {
            std::process::exit(1);
        }
    }

    if let Navigation::Redirect(to) = app.guard.before_each("/app").await {
        tracing::warn!(%to, "not signed in; set SUBTRACK_EMAIL and SUBTRACK_PASSWORD");
        return;
    }

    if app.subscriptions.fetch_subscriptions().await.is_err() {
        std::process::exit(1);
    }
    for sub in app.state.subscriptions() {
        tracing::info!(
            name = %sub.name,
            amount = sub.amount,
            currency = %sub.currency,
            cycle = ?sub.billing_cycle,
            next = %sub.next_billing_date,
            status = ?sub.status,
            "subscription"
        );
    }
}
