use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use tokio::select;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use botdeck_realtime::accounts::{Account, AccountRoster, AccountSwitchBus, BusSubscription};
use botdeck_realtime::config::Config;
use botdeck_realtime::login::{HttpPairingApi, LoginController, LoginEvent, PairingApi};
use botdeck_realtime::router::Subscription;
use botdeck_realtime::transport::WebSocketConnector;
use botdeck_realtime::{
    ConnectionEvent, ConnectionHandle, HotkeyDispatcher, HotkeyOutcome, MessageRouter,
};
use botdeck_wire::EventKind;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long)]
    config: String,
    #[arg(short, long)]
    logfile: Option<String>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if let Some(path) = args.logfile {
        let p = Path::new(&path);
        std::fs::create_dir_all(p.parent().unwrap()).unwrap();
        let logfile = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .open(p)
            .expect("log file to open successfully");
        let subscriber = tracing_subscriber::fmt::Subscriber::builder()
            .with_writer(logfile)
            .with_env_filter(EnvFilter::from_default_env())
            .finish();
        tracing::subscriber::set_global_default(subscriber).unwrap();
    } else {
        tracing_subscriber::fmt()
            .pretty()
            .with_env_filter(EnvFilter::from_default_env())
            .init();
    }

    let config = Config::load_from_path(&args.config).expect("config to load");

    // The composition root owns every piece explicitly; nothing here is a
    // process-global.
    let router = MessageRouter::new();
    let bus = AccountSwitchBus::new();
    let roster = Arc::new(AccountRoster::new(Arc::clone(&bus)));
    // A real dashboard fills the roster from the accounts API; the demo
    // seeds a static one so the digit chords have something to select.
    roster.set_accounts(vec![
        Account::new("acc-support", "Support line"),
        Account::new("acc-sales", "Sales line"),
        Account::new("acc-alerts", "Alerts broadcast"),
    ]);

    let (connection_events_tx, connection_events) = mpsc::unbounded_channel();
    let connection = ConnectionHandle::new(
        config.realtime.clone(),
        Arc::new(WebSocketConnector),
        Arc::clone(&router),
        connection_events_tx,
    );

    let (login_events_tx, login_events) = mpsc::unbounded_channel();
    let pairing = Arc::new(HttpPairingApi::new(&config.api)) as Arc<dyn PairingApi>;
    let login = LoginController::new(pairing, config.login.clone(), login_events_tx);

    let hotkeys = HotkeyDispatcher::new(Arc::clone(&roster));

    connection.connect().await;

    enable_raw_mode().expect("terminal raw mode");
    watch_loop(Widgets {
        connection,
        connection_events,
        login,
        login_events,
        hotkeys,
        roster,
        switches: bus.subscribe(),
        statuses: router.subscribe(EventKind::WhatsappStatus),
        messages: router.subscribe(EventKind::NewMessage),
        keys: spawn_key_reader(),
    })
    .await;
    disable_raw_mode().expect("terminal raw mode to restore");
}

struct Widgets {
    connection: ConnectionHandle,
    connection_events: mpsc::UnboundedReceiver<ConnectionEvent>,
    login: LoginController,
    login_events: mpsc::UnboundedReceiver<LoginEvent>,
    hotkeys: HotkeyDispatcher,
    roster: Arc<AccountRoster>,
    switches: BusSubscription,
    statuses: Subscription,
    messages: Subscription,
    keys: mpsc::UnboundedReceiver<KeyEvent>,
}

fn spawn_key_reader() -> mpsc::UnboundedReceiver<KeyEvent> {
    let (key_tx, key_rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || loop {
        match event::read() {
            Ok(Event::Key(key)) if key.kind == KeyEventKind::Press => {
                if key_tx.send(key).is_err() {
                    break;
                }
            }
            Ok(_) => {}
            Err(_) => break,
        }
    });
    key_rx
}

async fn watch_loop(mut widgets: Widgets) {
    status_line("(q) quit, (c) connect, (d) disconnect, (l) pair login");
    status_line("alt+1..9 select account, alt+0 account manager, alt+shift+0 refresh");
    match widgets.roster.active() {
        Some(account) => status_line(&format!("active account: {}", account.label)),
        None => status_line("no active account yet"),
    }

    loop {
        select! {
            Some(key) = widgets.keys.recv() => {
                if !handle_key(&mut widgets, key).await {
                    break;
                }
            }
            Some(event) = widgets.connection_events.recv() => {
                match event {
                    ConnectionEvent::Open => status_line("realtime socket open"),
                    ConnectionEvent::Closed { reason } => {
                        status_line(&format!("realtime socket closed: {reason}"));
                    }
                    ConnectionEvent::ReconnectExhausted => {
                        status_line("gave up reconnecting, press (c) to retry");
                    }
                }
            }
            Some(event) = widgets.login_events.recv() => {
                match event {
                    LoginEvent::StateChanged(state) => {
                        status_line(&format!("login state: {state}"));
                    }
                    LoginEvent::QrUpdated(qr) => {
                        status_line(&format!("scan pairing code: {qr}"));
                    }
                    LoginEvent::Completed => status_line("account paired"),
                    LoginEvent::TimedOut => status_line("pairing timed out, press (l) to retry"),
                }
            }
            Some(event) = widgets.switches.recv() => {
                status_line(&format!(
                    "switched to {} (was {})",
                    event.account_id,
                    event.previous_account_id.as_deref().unwrap_or("nothing"),
                ));
            }
            Some(envelope) = widgets.statuses.recv() => {
                status_line(&format!("status update: {}", envelope.data));
            }
            Some(envelope) = widgets.messages.recv() => {
                status_line(&format!("new message: {}", envelope.data));
            }
            else => break,
        }
    }
}

/// Returns `false` when the loop should exit.
async fn handle_key(widgets: &mut Widgets, key: KeyEvent) -> bool {
    if let Some(outcome) = widgets.hotkeys.handle(&key) {
        match outcome {
            HotkeyOutcome::Switched(account_id) => {
                status_line(&format!("hotkey switch to {account_id}"));
            }
            HotkeyOutcome::OpenAccountManager => {
                let labels: Vec<_> = widgets
                    .roster
                    .accounts()
                    .into_iter()
                    .map(|account| account.label)
                    .collect();
                status_line(&format!("accounts: {}", labels.join(", ")));
            }
            HotkeyOutcome::ForceRefresh => {
                status_line("forcing a reconnect");
                widgets.connection.disconnect().await;
                widgets.connection.connect().await;
            }
            HotkeyOutcome::Rejected(err) => status_line(&format!("hotkey rejected: {err}")),
        }
        return true;
    }

    match key.code {
        KeyCode::Char('q') => return false,
        KeyCode::Char('c') => widgets.connection.connect().await,
        KeyCode::Char('d') => widgets.connection.disconnect().await,
        KeyCode::Char('l') => widgets.login.start(),
        _ => {}
    }
    true
}

fn status_line(line: &str) {
    // Raw mode needs the explicit carriage return.
    print!("{line}\r\n");
}
