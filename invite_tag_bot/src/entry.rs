use std::{fs, sync::Arc};
use teloxide::{dptree::deps, prelude::*};

use crate::{
    config::{Config, CONFIG_PATH},
    database::Database,
    handlers::{generate_bot_commands, handle_callback_query, handle_message, ReportRegistry},
    interactive::Sessions,
    invites::checker::InviteChecker,
};

/// # Panics
///
/// Panics if there's no key file, the config is broken,
/// or the data files can't be set up.
pub async fn entry() {
    let key = fs::read_to_string(match cfg!(debug_assertions) {
        true => "key_debug",
        false => "key",
    })
    .expect("Could not load bot key file!");

    let config = Arc::new(Config::load(CONFIG_PATH).expect("Failed to load the config!"));

    let bot = Bot::new(key.trim());

    bot.set_my_commands(generate_bot_commands())
        .await
        .expect("Failed to set bot commands!");

    let database: Arc<Database> = Database::new(&config.data_dir)
        .await
        .expect("Failed to create database!");

    let checker = Arc::new(
        InviteChecker::new(
            &config.discord_api_url,
            config.invite_report.request_timeout(),
        )
        .expect("Failed to create the invite checker!"),
    );

    let sessions = Arc::new(Sessions::new());
    let reports = Arc::new(ReportRegistry::new());

    log::info!(
        "Loaded {} tags, {} fonted.",
        database.tag_counts().await.db,
        database.fonted_tags().len()
    );

    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint(handle_message))
        .branch(Update::filter_callback_query().endpoint(handle_callback_query));

    log::info!("Dispatching the dispatcher!");

    Dispatcher::builder(bot, handler)
        .default_handler(|_| async {})
        .dependencies(deps![database, config, sessions, checker, reports])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    log::info!("it appears we have been bonked.");
}
