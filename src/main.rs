use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use librascli::{
    ChannelHandler, Client, ClientBuilder, ConnectionState, FrameDisplay, GestureDefinition,
    Inbound, LifecycleEvent, ViewHandler, ViewState,
};
use std::time::Duration;
use tokio::{
    sync::{broadcast::error::RecvError, mpsc},
    time,
};
use tracing_subscriber::FmtSubscriber;

/// LibrasController client - command line interface for the gesture detection server
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Server address, either ws://host:port/path or host[:port][/path]
    #[arg(short, long, env = "LIBRAS_SERVER")]
    server: Option<String>,

    /// Server hostname or IP address (ignored with --server)
    #[arg(short = 'H', long, default_value = "localhost")]
    host: String,

    /// Server port (ignored with --server)
    #[arg(short, long, default_value_t = librascli::DEFAULT_PORT)]
    port: u16,

    /// Reconnect attempts before giving up
    #[arg(long, env = "LIBRAS_MAX_RECONNECT_ATTEMPTS",
          default_value_t = librascli::DEFAULT_MAX_RECONNECT_ATTEMPTS)]
    max_reconnect_attempts: u32,

    /// Delay of the first reconnect attempt in milliseconds
    #[arg(long, env = "LIBRAS_RECONNECT_BASE_DELAY_MS",
          default_value_t = librascli::DEFAULT_RECONNECT_BASE_DELAY_MS)]
    reconnect_base_delay_ms: u64,

    /// Heartbeat interval in milliseconds
    #[arg(long, env = "LIBRAS_HEARTBEAT_INTERVAL_MS",
          default_value_t = librascli::DEFAULT_HEARTBEAT_INTERVAL_MS)]
    heartbeat_interval_ms: u64,

    /// Connection timeout in seconds, also bounds how long to wait for replies
    #[arg(long, env = "LIBRAS_CONNECTION_TIMEOUT",
          default_value_t = librascli::DEFAULT_CONNECTION_TIMEOUT_SECS)]
    connection_timeout: u64,

    /// Do not reconnect after the connection drops
    #[arg(long)]
    no_reconnect: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Subcommands
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stay connected and follow the camera feed until Ctrl+C
    Watch {
        /// Ask the server to start detection on every (re)connect
        #[arg(long)]
        start_detection: bool,

        /// How often to request a frame, in milliseconds
        #[arg(long, default_value_t = 100)]
        frame_interval_ms: u64,
    },

    /// List the available cameras
    Cameras,

    /// List every saved gesture binding
    Binds,

    /// Show or change the active camera
    Camera {
        /// Camera to select
        #[arg(long)]
        set: Option<String>,
    },

    /// Look up a gesture by name
    Gesture {
        /// Gesture name
        name: String,
    },

    /// Show whether a gesture may be customized
    Customizable {
        /// Gesture name
        name: String,
    },

    /// Save a gesture binding
    SaveGesture {
        /// Gesture name
        #[arg(long)]
        name: String,

        /// Key or key combination to trigger
        #[arg(long)]
        bind: String,

        /// Hold duration in seconds
        #[arg(long, default_value_t = 0.0)]
        hold: f64,

        /// Toggle the key instead of pressing it
        #[arg(long)]
        toggle: bool,

        /// Replace an existing gesture of the same name
        #[arg(long)]
        overwrite: bool,
    },

    /// Start the detection process
    StartDetection,

    /// Stop the detection process
    StopDetection,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse();

    // Configure logging
    let log_level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    // Initialize the logging subscriber (also captures the library's `log` records)
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .try_init()
        .map_err(|e| anyhow!("Failed to set tracing subscriber: {}", e))?;

    let builder = client_builder(&cli)?;
    let timeout = builder.config().connection_timeout();

    match cli.command {
        Commands::Watch {
            start_detection,
            frame_interval_ms,
        } => {
            watch(
                builder,
                start_detection,
                Duration::from_millis(frame_interval_ms.max(1)),
            )
            .await?;
        }

        Commands::Cameras => {
            let cameras = query(builder, timeout, Client::send_get_available_cameras, |inbound| {
                match inbound {
                    Inbound::Cameras(cameras) => Some(cameras),
                    _ => None,
                }
            })
            .await?;

            for camera in cameras {
                println!("{}", camera);
            }
        }

        Commands::Binds => {
            let binds = query(builder, timeout, Client::send_get_all_binds, |inbound| {
                match inbound {
                    Inbound::Binds(binds) => Some(binds),
                    _ => None,
                }
            })
            .await?;

            let mut names: Vec<_> = binds.keys().cloned().collect();
            names.sort();
            for name in names {
                let binding = &binds[&name];
                println!(
                    "{}: {} (hold {}s)",
                    name, binding.bind, binding.tempo_pressionado
                );
            }
        }

        Commands::Camera { set: Some(camera) } => {
            let status = query(
                builder,
                timeout,
                |client| client.send_set_camera(camera.clone()),
                status_message,
            )
            .await?;
            println!("{}", status);
        }

        Commands::Camera { set: None } => {
            let camera = query(builder, timeout, Client::send_get_camera, |inbound| {
                match inbound {
                    Inbound::SelectedCamera(camera) => Some(camera),
                    _ => None,
                }
            })
            .await?;
            println!("{}", camera);
        }

        Commands::Gesture { name } => {
            // The server answers getGesto with no dedicated field, so look it up among the binds
            let binds = query(builder, timeout, Client::send_get_all_binds, |inbound| {
                match inbound {
                    Inbound::Binds(binds) => Some(binds),
                    _ => None,
                }
            })
            .await?;

            match binds.get(&name) {
                Some(binding) => println!(
                    "{}: {} (hold {}s)",
                    name, binding.bind, binding.tempo_pressionado
                ),
                None => bail!("Gesture '{}' not found", name),
            }
        }

        Commands::Customizable { name } => {
            let customizable = query(
                builder,
                timeout,
                |client| client.send_get_customizable_state(name.clone()),
                |inbound| match inbound {
                    Inbound::CustomizableState(customizable) => Some(customizable),
                    _ => None,
                },
            )
            .await?;
            println!("{}: {}", name, customizable);
        }

        Commands::SaveGesture {
            name,
            bind,
            hold,
            toggle,
            overwrite,
        } => {
            let gesture = GestureDefinition::new(name, bind, hold).toggle(toggle);
            let status = query(
                builder,
                timeout,
                |client| client.send_save_gesture(gesture.clone(), overwrite),
                status_message,
            )
            .await?;
            println!("{}", status);
        }

        Commands::StartDetection => {
            let status = query(
                builder,
                timeout,
                Client::send_start_detection,
                status_message,
            )
            .await?;
            println!("{}", status);
        }

        Commands::StopDetection => {
            let status = query(builder, timeout, Client::send_stop_detection, status_message)
                .await?;
            println!("{}", status);
        }
    }

    Ok(())
}

/// Create a client builder from the command line arguments
fn client_builder(cli: &Cli) -> Result<ClientBuilder> {
    let mut builder = Client::builder();

    if let Some(server) = &cli.server {
        builder = builder
            .server_uri(server)
            .context("Failed to parse server address")?;
    } else {
        builder = builder.host(cli.host.clone()).port(cli.port);
    }

    Ok(builder
        .auto_reconnect(!cli.no_reconnect)
        .max_reconnect_attempts(cli.max_reconnect_attempts)
        .reconnect_delay(cli.reconnect_base_delay_ms)
        .heartbeat_interval(cli.heartbeat_interval_ms)
        .connection_timeout(cli.connection_timeout))
}

fn status_message(inbound: Inbound) -> Option<String> {
    match inbound {
        Inbound::Status(status) => Some(status.message.unwrap_or(status.status)),
        _ => None,
    }
}

/// Connect and wait for the socket to open
async fn open(client: &Client, timeout: Duration) -> Result<()> {
    client.connect().await?;
    tracing::info!("Connecting to {}", client.config().server_url()?);

    time::timeout(timeout, client.wait_for_state(ConnectionState::Open))
        .await
        .context("Timed out waiting for the connection to open")??;
    Ok(())
}

/// Send one request and wait for the first reply `pick` accepts
async fn query<T>(
    builder: ClientBuilder,
    timeout: Duration,
    send: impl FnOnce(&Client),
    mut pick: impl FnMut(Inbound) -> Option<T>,
) -> Result<T> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let client = builder.build_with_handler(ChannelHandler::new(tx));

    open(&client, timeout).await?;
    send(&client);

    let reply = time::timeout(timeout, async {
        while let Some(inbound) = rx.recv().await {
            if let Inbound::ServerError(message) = inbound {
                bail!("Server error: {}", message);
            }
            if let Some(value) = pick(inbound) {
                return Ok(value);
            }
        }
        bail!("Client stopped before a reply arrived")
    })
    .await
    .context("Timed out waiting for the server reply");

    client.close().await?;
    reply?
}

/// Follow the camera feed until Ctrl+C
async fn watch(
    builder: ClientBuilder,
    start_detection: bool,
    frame_interval: Duration,
) -> Result<()> {
    let (handler, mut view) = ViewHandler::channel();
    let client = builder.build_with_handler(handler);
    let mut lifecycle = client.subscribe();

    client.connect().await?;
    tracing::info!(
        "Watching {}, press Ctrl+C to disconnect",
        client.config().server_url()?
    );

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut frames = time::interval(frame_interval);
    frames.set_missed_tick_behavior(time::MissedTickBehavior::Skip);
    let mut last_summary = String::new();

    loop {
        tokio::select! {
            result = &mut ctrl_c => {
                result?;
                tracing::info!("Received interrupt signal, disconnecting...");
                break;
            }
            event = lifecycle.recv() => match event {
                Ok(LifecycleEvent::Opened) => {
                    client.send_get_available_cameras();
                    client.send_get_camera();
                    if start_detection {
                        client.send_start_detection();
                    }
                }
                Ok(LifecycleEvent::ReconnectExhausted { attempts }) => {
                    bail!("Server unreachable after {} reconnect attempts", attempts);
                }
                Ok(LifecycleEvent::Closed) => {
                    tracing::info!("Connection closed");
                    break;
                }
                Ok(event) => tracing::debug!("Lifecycle event: {:?}", event),
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!("Missed {} lifecycle events", missed);
                }
                Err(RecvError::Closed) => break,
            },
            _ = frames.tick() => {
                if client.is_connected() {
                    client.send_get_frame();
                }
            }
            changed = view.changed() => {
                if changed.is_err() {
                    break;
                }
                let summary = summarize(&view.borrow_and_update());
                if summary != last_summary {
                    tracing::info!("{}", summary);
                    last_summary = summary;
                }
            }
        }
    }

    client.close().await?;
    tracing::info!("Disconnected successfully");
    Ok(())
}

fn summarize(state: &ViewState) -> String {
    let frame = match state.display() {
        FrameDisplay::Loading => "loading".to_string(),
        FrameDisplay::CameraOff => "camera off".to_string(),
        FrameDisplay::Live(_) => "live".to_string(),
    };

    format!(
        "frame: {} | camera: {} | available: [{}]",
        frame,
        state.selected_camera.as_deref().unwrap_or("-"),
        state.cameras.join(", ")
    )
}
