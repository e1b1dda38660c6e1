//! Drives login, refresh, verify and logout against the backends named in
//! the settings file.
//!
//! $ cargo run --bin auth_demo -- --settings=settings/dev.toml
//!
//! With `store.backend = "mysql"` the demo user is created on first run and
//! reused afterwards.
use futures_util::future::join_all;
use tokenvault::application_port::*;
use tokenvault::logger::*;
use tokenvault::server::*;
use tokenvault::settings::*;

const DEMO_USER: &str = "demo";
const DEMO_PASSWORD: &str = "demo-password";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let logger = Logger::new_bootstrap();
    let settings = parse_settings(cli.settings.as_deref())?;
    logger.reload_from_config(&LogConfig::resolve(&settings.log, cli.log_filter.as_deref()))?;

    let server = Server::try_new(&settings).await?;
    let auth = server.auth_service.clone();

    if let Err(e) = server.user_repo.create_user(DEMO_USER, DEMO_PASSWORD).await {
        info!("demo user not created ({e}), assuming it exists");
    }

    // region login
    let LoginResult { user, tokens } = auth
        .login_with_token(LoginInput {
            username: DEMO_USER.to_string(),
            password: DEMO_PASSWORD.to_string(),
        })
        .await?;
    println!("login -> user {} ({})", user.id, user.username);
    println!("access expires at {}", tokens.access_expires_at);
    println!("refresh expires at {}", tokens.refresh_expires_at);

    let wrong = auth
        .login_with_token(LoginInput {
            username: DEMO_USER.to_string(),
            password: "nope".to_string(),
        })
        .await;
    println!("wrong password -> {:?}", wrong.map(|r| r.user.id));
    // endregion

    // region verify
    let claims = auth.verify_token(&tokens.access_token).await?;
    println!("verify -> {:?}", claims);
    let session = auth.get_user_session(user.id).await?;
    println!("session -> id={} expires_at={}", session.id, session.expires_at);
    // endregion

    // region refresh
    let rotated = auth.refresh_token(&tokens.refresh_token).await?;
    println!("refresh -> new pair issued");
    let replay = auth.refresh_token(&tokens.refresh_token).await;
    println!("replayed refresh -> {:?}", replay.map(|_| ()));

    let racers = join_all((0..3).map(|_| auth.refresh_token(&rotated.refresh_token))).await;
    let winners = racers.iter().filter(|r| r.is_ok()).count();
    println!("concurrent refresh -> {winners} winner(s) out of {}", racers.len());
    // endregion

    // region logout
    let current = auth.get_user_session(user.id).await?;
    let latest = racers
        .into_iter()
        .flatten()
        .find(|pair| pair.refresh_token == current.refresh_token)
        .unwrap_or(rotated);
    auth.logout(user.id, &latest.access_token, &latest.refresh_token)
        .await?;
    println!(
        "after logout verify -> {:?}",
        auth.verify_token(&latest.access_token).await.map(|c| c.user_id)
    );
    println!(
        "after logout session -> {:?}",
        auth.get_user_session(user.id).await.map(|s| s.id)
    );
    // endregion

    println!("cache stats -> {:?}", server.cache.stats());
    server.shutdown().await;
    Ok(())
}
