use std::sync::Arc;

use futures::Stream;
use teloxide::{dispatching::Dispatcher, dptree, prelude::*};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use kroto_core::messaging::throttled::{ThrottleConfig, ThrottledMessenger};
use kroto_core::{
    config::Config,
    dispatch::{Dispatcher as UpdateDispatcher, LogErrorSink},
    domain::Update as CoreUpdate,
    lists::{ListKind, ListStore},
    pipeline::Moderator,
};

use crate::{convert::to_core_update, TelegramMessenger};

pub async fn run_polling(cfg: Arc<Config>) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.bot_token.clone());

    match bot.get_me().await {
        Ok(me) => info!(bot = %me.username(), "kroto started"),
        Err(e) => warn!(error = %e, "could not fetch bot identity"),
    }
    cfg.log_summary();

    let lists = Arc::new(ListStore::open(cfg.list_paths.clone()));
    let snapshot = lists.snapshot();
    info!(
        spam = snapshot.get(ListKind::Spam).len(),
        deny = snapshot.get(ListKind::Deny).len(),
        allow = snapshot.get(ListKind::Allow).len(),
        "lists loaded"
    );

    let cancel = CancellationToken::new();
    let watcher = cfg
        .list_reload_interval
        .map(|every| lists.spawn_watcher(every, cancel.clone()));

    // Throttle outbound calls to stay under flood limits; `TelegramMessenger`
    // still retries once on RetryAfter.
    let telegram = Arc::new(ThrottledMessenger::new(
        Arc::new(TelegramMessenger::new(bot.clone())),
        ThrottleConfig::default(),
    ));
    let moderator = Arc::new(Moderator::from_config(
        &cfg,
        lists,
        telegram.clone(),
        telegram,
    ));
    let executor = Arc::clone(moderator.executor());
    let updates = UpdateDispatcher::new(moderator, Arc::new(LogErrorSink));

    let (tx, rx) = mpsc::unbounded_channel::<CoreUpdate>();
    let ingest = tokio::spawn(async move { updates.run(receiver_stream(rx)).await });

    let handler = dptree::entry().endpoint(forward_update);
    let mut polling = Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![tx])
        .distribution_function(|_| None::<()>)
        .enable_ctrlc_handler()
        .build();
    polling.dispatch().await;
    // Dropping the dispatcher drops the last sender, which ends the update stream.
    drop(polling);

    if let Err(e) = ingest.await {
        warn!(error = %e, "update loop ended abnormally");
    }

    let purged = executor.purge_pending().await;
    info!(purged, "shutdown: pending notices removed");

    cancel.cancel();
    if let Some(watcher) = watcher {
        let _ = watcher.await;
    }

    Ok(())
}

async fn forward_update(
    update: Update,
    tx: mpsc::UnboundedSender<CoreUpdate>,
) -> ResponseResult<()> {
    if tx.send(to_core_update(&update)).is_err() {
        warn!(update_id = update.id, "update loop closed; dropping update");
    }
    Ok(())
}

fn receiver_stream(rx: mpsc::UnboundedReceiver<CoreUpdate>) -> impl Stream<Item = CoreUpdate> {
    futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|update| (update, rx))
    })
}
