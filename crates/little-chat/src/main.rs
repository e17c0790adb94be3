//! A terminal chat client with a canned reply source.

#[macro_use]
extern crate tracing;

use std::io::Write as _;
use std::time::Duration;

use chrono::Local;
use indicatif::{ProgressBar, ProgressStyle};
use little_chat::command::{Input, regenerate_target};
use little_chat::core::persistence::FileStore;
use little_chat::core::{
    ChatSnapshot, Controller, ControllerBuilder, MessageId, Notice, Rejection,
    Role,
};
use little_chat::render::{self, BAR_CHAR};
use little_chat::{CannedReplySource, Settings};
use owo_colors::OwoColorize;
use tokio::io::{self, AsyncBufReadExt};
use tokio::select;
use tokio::sync::mpsc;
use tokio::time::sleep;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let settings = Settings::from_env();
    let (notice_tx, mut notice_rx) = mpsc::unbounded_channel();

    let mut builder = ControllerBuilder::with_reply_source(
        CannedReplySource::with_delay(settings.reply_delay()),
    )
    .with_config(settings.chat_config())
    .on_notice(move |notice| {
        notice_tx.send(notice).ok();
    });
    match settings.data_dir().map(FileStore::new) {
        Some(Ok(store)) => {
            debug!("saving history in {}", store.dir().display());
            builder = builder.with_storage(store);
        }
        Some(Err(err)) => {
            warn!("history will not be saved: {err}");
        }
        None => {
            warn!("no data directory, history will not be saved");
        }
    }
    let controller = builder.build();

    print_history(&controller.snapshot());

    let progress_style = ProgressStyle::with_template("{spinner} {wide_msg}")
        .unwrap()
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");

    loop {
        print!("> ");
        std::io::stdout().flush().ok();

        let Some(line) = read_line().await else {
            break;
        };
        match Input::parse(&line) {
            Input::Empty => continue,
            Input::Prompt(prompt) => match controller.send(prompt).await {
                Ok(id) => follow_reply(&controller, &id, &progress_style).await,
                Err(rejection) => print_rejection(&rejection),
            },
            Input::Regenerate(nth) => {
                let snapshot = controller.snapshot();
                let Some(id) = regenerate_target(&snapshot.messages, nth)
                else {
                    println!("{}", "There is no such reply.".bright_yellow());
                    continue;
                };
                // Rejections worth showing arrive as notices.
                if controller.regenerate(id).await.is_ok() {
                    follow_reply(&controller, id, &progress_style).await;
                }
            }
            Input::History => print_history(&controller.snapshot()),
            Input::Clear => {
                let request = controller.request_clear();
                print!("Clear all history? [y/N]: ");
                std::io::stdout().flush().ok();

                let Some(line) = read_line().await else {
                    request.cancel();
                    break;
                };
                if line.trim().eq_ignore_ascii_case("y") {
                    if request.confirm().await.is_err() {
                        break;
                    }
                    println!("History cleared.");
                } else {
                    request.cancel();
                }
            }
            Input::Quit => break,
            Input::Usage(usage) => {
                println!("{} {usage}", "Usage:".bright_yellow());
            }
        }

        while let Ok(notice) = notice_rx.try_recv() {
            print_notice(&notice);
        }
    }

    controller.shutdown();
}

/// Prints the reply `id` as it streams in, until it settles.
async fn follow_reply(
    controller: &Controller,
    id: &MessageId,
    progress_style: &ProgressStyle,
) {
    let mut snapshot_rx = controller.subscribe();
    let mut progress_bar: Option<ProgressBar> = None;
    let mut printed = None;

    loop {
        let (text, is_loading, is_streaming) = {
            let snapshot = snapshot_rx.borrow_and_update();
            let Some(view) = snapshot.message(id) else {
                break;
            };
            (view.text.clone(), view.is_loading, view.is_streaming)
        };

        if is_loading {
            progress_bar
                .get_or_insert_with(|| {
                    let progress_bar = ProgressBar::new_spinner();
                    progress_bar.set_style(progress_style.clone());
                    progress_bar.set_message("🤔 Thinking...");
                    progress_bar
                })
                .inc(1);
        } else {
            // Finish the progress bar before printing anything else.
            if let Some(progress_bar) = progress_bar.take() {
                progress_bar.finish_and_clear();
            }
            let printed = printed.get_or_insert_with(|| {
                print!("{}", BAR_CHAR.bright_cyan());
                print!("{} ", render::role_label(Role::Assistant));
                0
            });
            let fresh = text.get(*printed..).unwrap_or_default();
            print!("{}", fresh.bright_white());
            *printed = text.len();
            std::io::stdout().flush().ok();
        }

        if !is_streaming {
            println!();
            break;
        }

        let sleep = sleep(Duration::from_millis(100));
        select! {
            changed = snapshot_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = sleep => {}
        }
    }

    if let Some(progress_bar) = progress_bar {
        progress_bar.finish_and_clear();
    }
}

fn print_history(snapshot: &ChatSnapshot) {
    for view in snapshot.messages.iter() {
        let bar = match view.role {
            Role::User => BAR_CHAR.bright_green().to_string(),
            Role::Assistant => BAR_CHAR.bright_cyan().to_string(),
        };
        println!("{bar}{}", render::header(view, &Local).dimmed());
        println!("{bar}{}", render::body(view).bright_white());
    }
}

fn print_rejection(rejection: &Rejection) {
    match rejection {
        Rejection::EmptyInput => {}
        Rejection::Busy => {
            println!("{}", "Still answering, please wait.".bright_yellow());
        }
        rejection => error!("{rejection}"),
    }
}

fn print_notice(notice: &Notice) {
    let bar = BAR_CHAR.bright_yellow();
    match notice {
        Notice::RegenerateRejected(rejection) => {
            println!("{bar}⚠️  Cannot regenerate: {rejection}");
        }
        Notice::SaveFailed(reason) => {
            println!("{bar}⚠️  History was not saved: {reason}");
        }
    }
}

async fn read_line() -> Option<String> {
    let mut stdin = io::BufReader::new(io::stdin());
    let mut line = String::new();

    match stdin.read_line(&mut line).await {
        Ok(count) => {
            if count == 0 {
                return None;
            }
            Some(line)
        }
        Err(err) => {
            error!("error reading input: {}", err);
            None
        }
    }
}
