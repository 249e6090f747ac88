use coin_dashboard::{CryptoDashboard, PollController, QueryEvent, Trend};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let search = std::env::args().nth(1).unwrap_or_default();

    let controller = PollController::new()?;
    let _polling = controller.start();
    let mut events = controller.events();

    let mut dashboard = CryptoDashboard::new(controller);
    dashboard.set_search(search);

    println!("Crypto Price Tracker (search: {:?})", dashboard.search());

    render(&dashboard);

    // Redraw only once a fetch settles, not on starts or retried failures
    loop {
        match events.recv().await {
            Ok(event) => {
                let settled = match &event {
                    QueryEvent::FetchSucceeded { .. } => true,
                    QueryEvent::FetchFailed { will_retry, .. } => !will_retry,
                    QueryEvent::FetchStarted { .. } => false,
                };
                if settled {
                    println!("\n[{}]", event);
                    render(&dashboard);
                }
            }
            Err(e) => {
                eprintln!("Event stream closed: {}", e);
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}

fn render(dashboard: &CryptoDashboard) {
    let view = dashboard.view();

    if let Some(message) = &view.error_message {
        println!("! {}", message);
    }

    if view.show_spinner {
        println!("Loading...");
        return;
    }

    if view.is_empty() {
        println!("{}", coin_dashboard::dashboard::NO_RESULTS_MESSAGE);
        return;
    }

    for row in &view.rows {
        let arrow = match row.trend {
            Trend::Up => "▲",
            Trend::Down => "▼",
            Trend::Flat => "-",
        };
        println!("{:<28} {:>14} {}", row.label, row.price, arrow);
    }
}
