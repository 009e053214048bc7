use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use serde_json::json;
use tokio::time::timeout;

use billboard_core::domain::{
    AdDocument, AdStatus, AdvertisementId, AuthorProfile, CounterKind, DisplaySelection, ViewRecord,
};
use billboard_core::engine::Viewer;
use billboard_core::impls::{InMemoryAdStore, SessionIdentity};
use billboard_core::ports::IdentityProvider;
use billboard_core::{Engine, EngineConfig, init_tracing};

const WAIT: std::time::Duration = std::time::Duration::from_secs(2);

/// デモ用のストア：6 件の広告と 2 人の作成者
async fn seed(store: &InMemoryAdStore) {
    store.put_author(AuthorProfile::new("u-ada", "Ada"));
    store.put_author(AuthorProfile::new("u-grace", "Grace"));

    let base = Utc::now() - Duration::days(1);
    for (i, name) in ["alpha", "bravo", "charlie", "delta", "echo", "foxtrot"]
        .iter()
        .enumerate()
    {
        let author = if i % 2 == 0 { "u-ada" } else { "u-grace" };
        let doc = AdDocument::new(*name, author, base + Duration::minutes(i as i64))
            .with_status(AdStatus::Active)
            .approved(true)
            .with_title(format!("Ad {name}"));
        store.upsert_ad(doc).await;
    }
    store
        .upsert_ad(AdDocument::new("draft", "u-ada", base).with_title("Not yet approved"))
        .await;
}

fn print_selection(label: &str, selection: &DisplaySelection) {
    println!("== {label} (visitor={})", selection.visitor().unwrap_or("-"));
    for (slot, ad) in selection.items().iter().enumerate() {
        println!(
            "  #{slot} {:<8} author_resolved={} impressions={} clicks={} visits={}",
            ad.id(),
            ad.author.is_resolved(),
            ad.counters.impressions,
            ad.counters.clicks,
            ad.counters.visits,
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing(None);

    // (A) 設定：引数があれば JSON ファイルから読む
    let config = match std::env::args().nth(1) {
        Some(path) => EngineConfig::load(&path).with_context(|| format!("loading {path}"))?,
        None => EngineConfig::default(),
    };

    // (B) ストアと訪問者
    let store = Arc::new(InMemoryAdStore::new());
    seed(&store).await;
    let session = Arc::new(SessionIdentity::anonymous(IpAddr::V4(Ipv4Addr::new(203, 0, 113, 9))));

    // 匿名訪問者は foxtrot を 1 時間以内に 3 回見ている → cap 中
    let anonymous = session.current();
    let now = Utc::now();
    store.set_view_record(
        &AdvertisementId::new("foxtrot"),
        anonymous.key(),
        ViewRecord::new(vec![
            now - Duration::minutes(50),
            now - Duration::minutes(30),
            now - Duration::minutes(5),
        ]),
    );

    // (C) エンジン起動
    let engine = Engine::builder()
        .store(store.clone())
        .identity(session.clone())
        .config(config)
        .build()
        .context("building engine")?;
    engine.activate().await?;

    let mut selection = engine.selection();
    let first = timeout(WAIT, selection.wait_for(|s| !s.is_empty()))
        .await
        .context("waiting for first selection")??
        .clone();
    print_selection("anonymous", &first);

    // (D) エンゲージメントの記録 → カウンタがライブで更新される
    let alpha = AdvertisementId::new("alpha");
    store
        .push_counter_doc(&alpha, CounterKind::Impressions, json!({"impression": 12}))
        .await;
    store
        .push_counter_doc(&alpha, CounterKind::Clicks, json!({"clicked": 3}))
        .await;
    store
        .push_counter_doc(&alpha, CounterKind::Visits, json!({"visits": [now.to_rfc3339()]}))
        .await;

    let mut active = engine.active_set();
    let snapshot = timeout(
        WAIT,
        active.wait_for(|ads| {
            ads.iter()
                .any(|ad| ad.id() == &alpha && ad.counters.clicks == 3 && ad.counters.visits == 1)
        }),
    )
    .await
    .context("waiting for counters")??
    .clone();
    println!("== active set ({} records)", snapshot.len());
    for ad in snapshot.iter() {
        println!("  {:<8} {:?}", ad.id(), ad.counters);
    }

    // (E) ログイン → identity が変わるので frequency cap を再評価
    session.sign_in("member-7");
    let signed_in = timeout(WAIT, selection.wait_for(|s| s.visitor() == Some("member-7")))
        .await
        .context("waiting for recomputed selection")??
        .clone();
    print_selection("signed in", &signed_in);

    // (F) 管理画面：Grace が作成した広告だけ
    let listing = engine.watch_listing(Viewer::author("u-grace"));
    let mut rows = listing.subscribe();
    let own = timeout(WAIT, rows.wait_for(|rows| !rows.is_empty()))
        .await
        .context("waiting for listing")??
        .clone();
    println!("== listing for u-grace");
    for ad in own.iter() {
        println!("  {:<8} {:?}", ad.id(), ad.document.status);
    }
    listing.teardown().await;

    println!("status: {:?}", engine.status());
    engine.teardown().await;
    println!("status after teardown: {:?}", engine.status());
    tracing::info!("demo finished");
    Ok(())
}
