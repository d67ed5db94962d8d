use std::sync::Arc;

use anyhow::{Context, Result};

use crate::{
    cli::{Cli, Command},
    domain,
    infra::{self, config::AppConfig, contracts::CredentialStore, credential_store::FileCredentialStore},
    remote::{self, replay::ReplayRemote},
    ui::{self, console::ConsoleHandler},
    usecases::{
        self, bootstrap,
        bot::{Bot, BotError, BotOptions},
        context::AppContext,
        hot_login::{LoginError, LoginSource, PrintChallengeUrl},
        logout::logout_and_reset,
    },
};

const REMOTE_NOT_CONFIGURED: &str = "REMOTE_NOT_CONFIGURED";

pub fn run(cli: Cli) -> Result<()> {
    let context = bootstrap::bootstrap(cli.config.as_deref())?;

    tracing::debug!(
        ui = ui::module_name(),
        domain = domain::module_name(),
        remote = remote::module_name(),
        usecases = usecases::module_name(),
        infra = infra::module_name(),
        "module boundaries loaded"
    );

    match cli.command_or_default() {
        Command::Run { no_persist } => watch(&context, no_persist),
        Command::Logout => {
            let store = FileCredentialStore::new(context.token_file()?);
            let outcome = logout_and_reset(&store)?;
            tracing::info!(token_removed = outcome.token_removed, "logout completed");
            println!("Logout completed. The next run will require a fresh login.");
            Ok(())
        }
    }
}

fn watch(context: &AppContext, no_persist: bool) -> Result<()> {
    let remote = build_remote(&context.config)?;
    let mut bot = Bot::new(
        remote,
        ConsoleHandler::stdout(),
        PrintChallengeUrl,
        BotOptions::from(&context.config),
    );

    let stop = bot.stop_handle();
    infra::shutdown::on_ctrl_c(move || stop.stop())
        .context("failed to install ctrl-c handler")?;

    let login = if no_persist {
        bot.login().map(|()| {
            tracing::info!("logged in without persisting the session");
        })
    } else {
        let store: Arc<dyn CredentialStore> =
            Arc::new(FileCredentialStore::new(context.token_file()?));
        bot.hot_login(store).map(|source| {
            tracing::info!(
                resumed = matches!(source, LoginSource::Resumed),
                "logged in"
            );
        })
    };
    match login {
        Ok(()) => {}
        Err(BotError::Login(LoginError::Cancelled)) => {
            println!("Login cancelled.");
            return Ok(());
        }
        Err(error) => return Err(error.into()),
    }

    let directory = bot.contact_directory()?;
    tracing::info!(contacts = directory.len(), "watching for events");

    bot.block().map_err(|error| {
        tracing::error!(code = %error.code(), error = %error, "dispatch terminated");
        anyhow::Error::new(error).context("event dispatch terminated")
    })
}

fn build_remote(config: &AppConfig) -> Result<ReplayRemote> {
    let Some(path) = config.remote.replay_file.as_deref() else {
        anyhow::bail!("{REMOTE_NOT_CONFIGURED}: set [remote].replay_file in the config file");
    };

    Ok(ReplayRemote::open(path)?)
}
