use clap::Parser;
use std::{
    error::Error,
    io::{self, Write},
    net::SocketAddr,
    time::Duration,
};

use warden::{
    AdminClient, AdminPolicy, BcryptHasher, ClusterConfig, PasswordHasher, Session, TcpCluster,
    cli::{Command, CommandError, prompt, run},
};

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Seed node address; may be repeated
    #[arg(long = "host", default_value = "127.0.0.1:3000")]
    hosts: Vec<SocketAddr>,

    /// User to authenticate as
    #[arg(long, short)]
    user: Option<String>,

    /// Password for `--user`
    #[arg(long, env = "WARDEN_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Deadline for a single admin command
    #[arg(long, default_value_t = 60_000)]
    timeout_ms: u64,

    /// Deadline for opening and authenticating a connection
    #[arg(long, default_value_t = 1_000)]
    connect_timeout_ms: u64,
}

fn main() -> Result<(), Box<dyn Error>> {
    // Initialize env_logger; For logging to STDOUT/STDERR
    env_logger::init();

    let cli = Cli::parse();

    let session = match (cli.user, cli.password) {
        (Some(user), Some(password)) => Session::new(user, BcryptHasher.hash(&password)?),
        (Some(_), None) => return Err("--user requires --password or WARDEN_PASSWORD".into()),
        _ => Session::anonymous(),
    };

    let mut config = ClusterConfig::new(cli.hosts);
    config.connect_timeout = Duration::from_millis(cli.connect_timeout_ms);

    let cluster = TcpCluster::new(config, session.clone());
    let mut client = AdminClient::new(cluster, session)
        .with_policy(AdminPolicy::with_timeout(Duration::from_millis(cli.timeout_ms)));

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        let cmd = match prompt(stdin.lock(), stdout.lock()) {
            Ok(Command::Exit) => break,
            Ok(c) => c,
            Err(CommandError::Input(e)) => return Err(e.into()),
            Err(CommandError::Empty) => continue,
            Err(e) => {
                eprintln!("{e}");
                continue;
            }
        };

        if let Err(e) = run(&mut client, cmd, &mut stdout) {
            eprintln!("command error: {e}");
        }
        stdout.flush()?;
    }

    Ok(())
}
