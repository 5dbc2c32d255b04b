use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use avera::auth::{IdentityProvider, SessionBridge, SessionContext};
use avera::backend::{PostRepository, ReviewRepository};
use avera::config::{Config, GlobalArgs};
use avera::db::models::{ImageList, ProfileUpdate};
use avera::display;
use avera::error::{AppError, AppResult};
use avera::feed::{FeedFilter, PostDraft};
use avera::ingest::select_images;
use avera::state::AppState;

#[derive(Parser, Debug)]
#[command(name = "avera", about = "Share outfits and collect style feedback")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sign in with a Google ID token
    SignIn {
        #[arg(long)]
        id_token: String,
    },
    SignOut,
    /// Show the signed-in user
    Whoami,
    /// List posts, newest first
    Feed {
        /// Only your own posts
        #[arg(long)]
        mine: bool,
    },
    #[command(subcommand)]
    Post(PostCommand),
    /// List occasion categories
    Occasions,
    /// List the reviews on a post
    Reviews { post_id: String },
    #[command(subcommand)]
    Review(ReviewCommand),
    #[command(subcommand)]
    Profile(ProfileCommand),
    /// Show AI style feedback for a post
    Feedback {
        post_id: String,
        /// Ask again even if feedback is cached
        #[arg(long)]
        refresh: bool,
    },
    /// Register this device's push token
    PushToken { token: String },
}

#[derive(Subcommand, Debug)]
enum PostCommand {
    Create {
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        content: Option<String>,
        /// Image file (repeat for up to three)
        #[arg(long = "image")]
        images: Vec<PathBuf>,
        /// Occasion id, see `avera occasions`
        #[arg(long)]
        occasion: Option<i64>,
    },
    Delete { post_id: String },
}

#[derive(Subcommand, Debug)]
enum ReviewCommand {
    Add {
        post_id: String,
        /// 1 to 5 stars
        #[arg(long)]
        rating: i64,
        #[arg(long)]
        text: Option<String>,
    },
    Delete { review_id: String },
}

#[derive(Subcommand, Debug)]
enum ProfileCommand {
    /// Show a profile and its stats (yours by default)
    Show { user_id: Option<String> },
    Update {
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        avatar_url: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so command output stays clean
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.global)?;
    let state = AppState::from_config(config)?;

    let mut bridge = state.session_bridge();
    bridge.start().await;

    let result = run(cli.command, &state, &bridge).await;
    bridge.shutdown();

    if let Err(e) = result {
        if e.is_retryable() {
            tracing::error!("Command failed: {}", e);
        }
        eprintln!("{}", e.user_message());
        std::process::exit(1);
    }
    Ok(())
}

async fn run(command: Command, state: &AppState, bridge: &SessionBridge) -> AppResult<()> {
    let session = bridge.context();
    match command {
        Command::SignIn { id_token } => {
            let user = bridge.sign_in(IdentityProvider::Google, &id_token).await?;
            println!(
                "Signed in as {}",
                user.full_name.as_deref().unwrap_or(&user.id)
            );
        }
        Command::SignOut => {
            bridge.sign_out().await?;
            println!("Signed out");
        }
        Command::Whoami => match session.current_user() {
            Some(user) => {
                println!("{}", user.id);
                if let Some(email) = user.email {
                    println!("  {}", email);
                }
            }
            None => println!("Not signed in"),
        },
        Command::Feed { mine } => {
            let filter = if mine { FeedFilter::Mine } else { FeedFilter::All };
            let snapshot = state.feed(session).load(filter).await;
            if let Some(e) = snapshot.error {
                return Err(e);
            }
            if snapshot.posts.is_empty() {
                println!("No posts yet");
            }
            for view in &snapshot.posts {
                println!("{}", display::render_post(view));
            }
        }
        Command::Post(cmd) => run_post(cmd, state, session).await?,
        Command::Occasions => {
            for occasion in state.feed(session).occasions().await? {
                println!("{}", display::render_occasion(&occasion));
            }
        }
        Command::Reviews { post_id } => {
            let list = state.review_ledger().list_reviews(&post_id).await?;
            println!("{}", display::review_summary(&list.stats));
            for review in &list.reviews {
                println!("{}", display::render_review(review));
            }
        }
        Command::Review(cmd) => run_review(cmd, state, session).await?,
        Command::Profile(cmd) => run_profile(cmd, state, session).await?,
        Command::Feedback { post_id, refresh } => {
            let service = state.feedback_service();
            let feedback = if refresh {
                service.request_feedback(&post_id).await?
            } else {
                service.cached_or_request(&post_id).await?
            };
            println!("{}", display::render_feedback(&feedback));
        }
        Command::PushToken { token } => {
            state.profile_service(session).save_push_token(&token).await?;
            println!("Push token saved");
        }
    }
    Ok(())
}

async fn run_post(cmd: PostCommand, state: &AppState, session: SessionContext) -> AppResult<()> {
    let feed = state.feed(session.clone());
    match cmd {
        PostCommand::Create {
            title,
            content,
            images,
            occasion,
        } => {
            let user = session.require_user()?;
            let limits = *feed.limits();
            let picked = select_images(&[], &images, limits.max_images)?;

            // Check the text before anything is uploaded.
            let draft = PostDraft {
                title,
                content,
                images: ImageList::default(),
                occasion,
            };
            draft.clone().validate(&user.id, &limits)?;

            let images = state.image_ingestor().ingest(&picked).await?;
            let post = feed.create_post(PostDraft { images, ..draft }).await?;
            println!("Created post {}", post.post_id);
        }
        PostCommand::Delete { post_id } => {
            feed.delete_post(&post_id).await?;
            println!("Deleted post {}", post_id);
        }
    }
    Ok(())
}

async fn post_owner(state: &AppState, post_id: &str) -> AppResult<String> {
    let post = state
        .posts
        .get_post(post_id)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(post.user_id)
}

async fn run_review(cmd: ReviewCommand, state: &AppState, session: SessionContext) -> AppResult<()> {
    let user = session.require_user()?;
    let ledger = state.review_ledger();
    match cmd {
        ReviewCommand::Add {
            post_id,
            rating,
            text,
        } => {
            let owner = post_owner(state, &post_id).await?;
            let review = ledger
                .add_review(&post_id, &user.id, &owner, rating, text)
                .await?;
            println!("{}", display::render_review(&review));
        }
        ReviewCommand::Delete { review_id } => {
            let review = state
                .reviews
                .get_review(&review_id)
                .await
                .map_err(AppError::LedgerUnavailable)?
                .ok_or(AppError::NotFound)?;
            let owner = post_owner(state, &review.post_id).await?;
            ledger
                .delete_review(&review_id, &review.post_id, &user.id, &owner)
                .await?;
            println!("Deleted review {}", review_id);
        }
    }
    Ok(())
}

async fn run_profile(
    cmd: ProfileCommand,
    state: &AppState,
    session: SessionContext,
) -> AppResult<()> {
    let service = state.profile_service(session.clone());
    match cmd {
        ProfileCommand::Show { user_id } => {
            let user_id = match user_id {
                Some(id) => id,
                None => session.require_user()?.id,
            };
            let (profile, stats) =
                tokio::try_join!(service.get_profile(&user_id), service.get_stats(&user_id))?;
            println!("{}", display::render_profile(&profile, &stats));
        }
        ProfileCommand::Update { name, avatar_url } => {
            let user = session.require_user()?;
            let profile = service
                .update_profile(
                    &user.id,
                    ProfileUpdate {
                        full_name: name,
                        avatar_url,
                    },
                )
                .await?;
            println!("Updated {}", profile.display_name());
        }
    }
    Ok(())
}
