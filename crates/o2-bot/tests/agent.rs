//! End-to-end: configuration, auth flow, session keys and the engine
//! wired together against the in-memory venue.

use async_trait::async_trait;
use o2_auth::{AuthFlowState, AuthResult, WhitelistRegistry};
use o2_bot::{AppConfig, AppError, Application};
use o2_core::{
    AddressKind, AssetInfo, ManualClock, Market, OwnerAddress, StrategyConfig, StrategyKind,
};
use o2_session::{DynOwner, LocalOwnerSigner};
use o2_store::{DurableStore, LocalStore};
use o2_venue::mock::MockVenue;
use o2_venue::{AssignCodeResponse, VerifyAccessResponse};
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;

const OWNER_KEY: &str = "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";
const PASSWORD: &str = "correct horse battery staple";

struct NotWhitelisted;

#[async_trait]
impl WhitelistRegistry for NotWhitelisted {
    async fn is_whitelisted(&self, _trade_account_id: &str, _whitelist_id: &str) -> AuthResult<bool> {
        Ok(false)
    }
}

fn market() -> Market {
    let asset = |byte: &str, symbol: &str, decimals| AssetInfo {
        asset: format!("0x{}", byte.repeat(32)),
        symbol: symbol.to_string(),
        decimals,
        max_precision: 3,
    };
    Market {
        market_id: "m1".to_string(),
        contract_id: format!("0x{}", "0b".repeat(32)),
        base: asset("aa", "FUEL", 9),
        quote: asset("bb", "USDC", 6),
        tick_size: None,
        step_size: None,
    }
}

fn venue() -> Arc<MockVenue> {
    let venue = Arc::new(MockVenue::new());
    let market = market();
    venue.add_market(market.clone());
    venue.set_ticker(&market.market_id, dec!(2000000));
    venue.set_balance(&market.quote.asset, dec!(100000000));
    venue
}

fn auto_approved() -> VerifyAccessResponse {
    VerifyAccessResponse {
        success: true,
        auto_approved: Some(true),
        ..Default::default()
    }
}

fn config() -> AppConfig {
    let mut config = AppConfig::default();
    config.strategies = vec![StrategyConfig::new(
        "m1",
        StrategyKind::MarketMaking(Default::default()),
    )];
    config
}

fn app(config: AppConfig, venue: Arc<MockVenue>, store: Arc<LocalStore>) -> Application {
    let app = Application::with_components(
        config,
        venue,
        store,
        Arc::new(NotWhitelisted),
        Arc::new(ManualClock::new(1_000_000)),
    );
    app.set_session_password(PASSWORD);
    app
}

fn wallet() -> DynOwner {
    Arc::new(LocalOwnerSigner::from_hex(OWNER_KEY, AddressKind::Ethereum, None).unwrap())
}

fn owner() -> OwnerAddress {
    wallet().address()
}

#[tokio::test]
async fn test_approved_owner_authenticates_and_trades() {
    let venue = venue();
    venue.set_verify_response(auto_approved());
    let store = Arc::new(LocalStore::in_memory());
    let app = app(config(), venue.clone(), store.clone());

    let session_id = app.authenticate(wallet(), true).await.unwrap();
    assert_eq!(app.auth().state(), AuthFlowState::Ready);
    assert_eq!(venue.call_count("create_session"), 1);

    assert_eq!(app.seed_strategies().unwrap(), 1);
    assert_eq!(app.seed_strategies().unwrap(), 0);

    let engine = app.build_engine(&owner()).await.unwrap();
    engine.start().await.unwrap();
    assert!(engine.is_active());
    assert_eq!(engine.market_ids(), vec!["m1".to_string()]);

    for _ in 0..100 {
        if !store.trades_by_session(&session_id).unwrap().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    engine.stop();

    let submissions = venue.submissions();
    assert_eq!(submissions.len(), 1);
    // Session registration used nonce 0
    assert_eq!(submissions[0].nonce, "1");

    let trades = store.trades_by_session(&session_id).unwrap();
    assert_eq!(trades.len(), 1);
    assert!(trades[0].success);
    assert_eq!(trades[0].market_id, "m1");
}

#[tokio::test]
async fn test_terms_must_be_accepted() {
    let venue = venue();
    venue.set_verify_response(auto_approved());
    let app = app(config(), venue.clone(), Arc::new(LocalStore::in_memory()));

    let err = app.authenticate(wallet(), false).await.unwrap_err();
    assert!(matches!(
        err,
        AppError::NotReady {
            state: AuthFlowState::AwaitingTerms,
            ..
        }
    ));
    assert_eq!(app.auth().state(), AuthFlowState::Idle);
    assert_eq!(venue.call_count("create_session"), 0);
}

#[tokio::test]
async fn test_waitlisted_owner_is_not_ready() {
    let venue = venue();
    venue.set_verify_response(VerifyAccessResponse {
        success: true,
        auto_approved: Some(false),
        queue_position: Some(4),
        ..Default::default()
    });
    let app = app(config(), venue, Arc::new(LocalStore::in_memory()));

    match app.authenticate(wallet(), true).await {
        Err(AppError::NotReady { state, reason }) => {
            assert_eq!(state, AuthFlowState::DisplayingAccessQueue);
            assert!(reason.contains("position 4"));
        }
        other => panic!("unexpected result {other:?}"),
    }
    assert!(app.build_engine(&owner()).await.is_err());
}

#[tokio::test]
async fn test_configured_invite_unlocks_session() {
    // Queue unavailable, so the flow asks for an invitation
    let venue = venue();
    venue.set_assign_response(Ok(AssignCodeResponse {
        success: true,
        error: None,
    }));
    let mut config = config();
    config.auth.invite_code = Some("FRIEND".to_string());
    let app = app(config, venue.clone(), Arc::new(LocalStore::in_memory()));

    app.authenticate(wallet(), true).await.unwrap();
    assert_eq!(venue.call_count("assign_invitation_code"), 1);
    assert_eq!(app.auth().context().invitation_code.as_deref(), Some("FRIEND"));
}

#[tokio::test]
async fn test_session_and_configs_survive_restart() {
    let venue = venue();
    venue.set_verify_response(auto_approved());
    let store = Arc::new(LocalStore::in_memory());

    let first = app(config(), venue.clone(), store.clone());
    let session_id = first.authenticate(wallet(), true).await.unwrap();
    first.seed_strategies().unwrap();

    let mut edited = store.get_strategy_config("m1").unwrap().unwrap();
    edited.config.name = "edited".to_string();
    store.put_strategy_config(&edited).unwrap();

    let second = app(config(), venue.clone(), store.clone());
    assert_eq!(second.authenticate(wallet(), true).await.unwrap(), session_id);
    assert_eq!(second.seed_strategies().unwrap(), 0);
    assert_eq!(venue.call_count("create_session"), 1);
    assert_eq!(
        store.get_strategy_config("m1").unwrap().unwrap().config.name,
        "edited"
    );

    let engine = second.build_engine(&owner()).await.unwrap();
    engine.start().await.unwrap();
    assert_eq!(engine.config("m1").unwrap().name, "edited");
    engine.stop();
}

#[test]
fn test_new_reads_session_password_from_env() {
    let mut config = AppConfig::default();
    config.session.password_env = "O2_TEST_SESSION_PASSWORD_UNSET".to_string();
    config.venue.base_url = "http://127.0.0.1:1".to_string();
    assert!(Application::new(config).is_ok());
}
