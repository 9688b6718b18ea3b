//! # agora
//!
//! Terminal front end for the community site, backed by the local store.
//!
//! Lines typed on stdin are posted to the chat room. A few slash commands
//! drive the rest:
//! - `/login <email>` and `/logout`
//! - `/stats` prints the student hub counters
//! - `/quit`

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use agora_client::events::{Notice, NoticeLevel};
use agora_client::{
    AppContext, ChatRoom, ClientConfig, Gallery, Notices, Screen, StudentHub, VideoWall,
};
use agora_shared::User;
use agora_store::{Database, LocalBackend, LocalBackendConfig};

/// How often buffered change events are applied.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

struct Screens {
    chat: ChatRoom,
    gallery: Gallery,
    videos: VideoWall,
    hub: StudentHub,
}

impl Screens {
    fn new(ctx: &AppContext) -> Self {
        Self {
            chat: ChatRoom::new(ctx.clone()),
            gallery: Gallery::new(ctx.clone()),
            videos: VideoWall::new(ctx.clone()),
            hub: StudentHub::new(ctx.clone()),
        }
    }

    fn all(&mut self) -> [&mut dyn Screen; 4] {
        [
            &mut self.chat,
            &mut self.gallery,
            &mut self.videos,
            &mut self.hub,
        ]
    }

    async fn open(&mut self) {
        for screen in self.all() {
            if let Err(e) = screen.open().await {
                warn!(screen = screen.name(), error = %e, "Screen failed to open");
            }
        }
    }

    async fn on_identity_change(&mut self, user: Option<&User>) {
        for screen in self.all() {
            if let Err(e) = screen.on_identity_change(user).await {
                warn!(screen = screen.name(), error = %e, "Re-subscribe failed");
            }
        }
        // The chat room is login-gated, so it may not be open yet.
        if user.is_some() && !self.chat.list().is_subscribed() {
            if let Err(e) = self.chat.open().await {
                warn!(error = %e, "Chat failed to open");
            }
        }
    }

    fn poll(&mut self) {
        let seen = self.chat.messages().len();
        for screen in self.all() {
            let arrived = screen.poll();
            if arrived > 0 {
                info!(screen = screen.name(), arrived, "New records");
            }
        }
        for message in self.chat.messages().iter().skip(seen) {
            let who = if self.chat.is_mine(message) {
                "you".to_string()
            } else {
                message.user_id.short()
            };
            println!("<{who}> {}", message.content);
        }
    }

    fn close(&mut self) {
        for screen in self.all() {
            screen.close();
        }
    }
}

fn print_notice(notice: &Notice) {
    let tag = match notice.level {
        NoticeLevel::Success => "ok",
        NoticeLevel::Error => "error",
    };
    match &notice.description {
        Some(description) => println!("[{tag}] {}: {description}", notice.title),
        None => println!("[{tag}] {}", notice.title),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    agora_client::init_tracing();
    info!("Starting Agora v{}", env!("CARGO_PKG_VERSION"));

    let config = ClientConfig::from_env();
    info!(?config, "Loaded configuration");

    tokio::fs::create_dir_all(&config.data_dir)
        .await
        .with_context(|| format!("creating {}", config.data_dir.display()))?;
    let db = Database::open_at(&config.data_dir.join("agora.db"))?;

    let mut store_config = LocalBackendConfig::new(config.data_dir.join("objects"));
    store_config.public_base_url = config.public_base_url.clone();
    store_config.max_object_size = config.max_upload_size;
    let backend = Arc::new(LocalBackend::open(db, store_config).await?);

    if let Some(email) = &config.user_email {
        let user = backend.sign_in_or_register(email)?;
        info!(user = %user.id, "Signed in");
    }

    let (notices, mut notice_rx) = Notices::channel();
    let ctx = AppContext::new(backend.clone(), notices, config);
    let mut session = ctx.session.clone();

    let mut screens = Screens::new(&ctx);
    screens.open().await;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut tick = tokio::time::interval(POLL_INTERVAL);

    loop {
        tokio::select! {
            _ = tick.tick() => screens.poll(),

            Some(notice) = notice_rx.recv() => print_notice(&notice),

            Some(user) = session.changed() => {
                info!(signed_in = user.is_some(), "Identity changed");
                screens.on_identity_change(user.as_ref()).await;
            }

            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let line = line.trim();
                match line.split_once(' ').unwrap_or((line, "")) {
                    ("/quit", _) => break,
                    ("/logout", _) => backend.sign_out(),
                    ("/login", email) => {
                        if let Err(e) = backend.sign_in_or_register(email.trim()) {
                            println!("[error] Login failed: {e}");
                        }
                    }
                    ("/stats", _) => {
                        let stats = screens.hub.stats();
                        println!(
                            "doubts: {}  resolved: {}  materials: {}  contributors: {}",
                            stats.doubts, stats.resolved, stats.materials, stats.contributors
                        );
                    }
                    ("", _) => {}
                    _ => {
                        // Failures are reported through the notice channel.
                        let _ = screens.chat.send(line).await;
                    }
                }
            }

            _ = tokio::signal::ctrl_c() => break,
        }
    }

    screens.close();
    info!(
        active_subscriptions = backend.active_subscriptions(),
        "Shut down"
    );
    Ok(())
}
