//! Arista EOS example
//!
//! Connects to one or more Arista EOS switches concurrently, prints their
//! facts and boot image, and optionally applies an interface description
//! under a checkpoint that is rolled back if anything fails.
//!
//! # Prerequisites
//!
//! - Arista EOS switch (vEOS, cEOS, or hardware)
//! - Valid credentials with appropriate permissions
//!
//! # Usage
//!
//! ```bash
//! cargo run --example arista_eos -- --host spine1 --host spine2 --user admin --password secret
//! ```
//!
//! With the configuration demo:
//! ```bash
//! cargo run --example arista_eos -- --host spine1 --user admin --password secret --describe Ethernet1
//! ```

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use ferrinet::transport::HostKeyVerification;
use ferrinet::{Device, DeviceBuilder, EosDevice, SshTransport, with_session};
use futures_util::future::join_all;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    println!("=== Ferrinet Arista EOS Example ===\n");

    let mut devices = Vec::with_capacity(args.hosts.len());
    for host in &args.hosts {
        let mut builder = DeviceBuilder::new(host)
            .port(args.port)
            .username(&args.user)
            .timeout(Duration::from_secs(args.timeout))
            .host_key_verification(HostKeyVerification::Disabled);

        if let Some(password) = &args.password {
            builder = builder.password(password);
        } else if let Some(key_path) = &args.key {
            builder = builder.private_key(key_path);
        } else {
            eprintln!("Error: Must provide either --password or --key");
            std::process::exit(1);
        }
        if let Some(secret) = &args.enable_secret {
            builder = builder.enable_secret(secret);
        }

        devices.push(builder.build()?);
    }

    // Distinct devices are independent, so drive them concurrently
    let results = join_all(
        devices
            .iter_mut()
            .map(|device| inspect(device, args.describe.as_deref())),
    )
    .await;

    for (host, result) in args.hosts.iter().zip(results) {
        match result {
            Ok(()) => println!("{host}: done"),
            Err(e) => eprintln!("{host}: {e}"),
        }
    }

    Ok(())
}

async fn inspect(
    device: &mut EosDevice<SshTransport>,
    describe: Option<&str>,
) -> Result<(), ferrinet::Error> {
    let describe = describe.map(str::to_string);
    with_session(device, move |device| {
        Box::pin(async move {
            let facts = device.facts().await?;
            println!("--- {} ({}) ---", facts.hostname, facts.fqdn);
            println!("  model:      {}", facts.model);
            println!("  os_version: {}", facts.os_version);
            println!("  uptime:     {}", facts.uptime_string);
            println!("  interfaces: {}", facts.interfaces.len());
            println!("  vlans:      {}", facts.vlans.join(", "));

            let boot = device.boot_options().await?;
            println!("  boot image: {}", boot.system_image().unwrap_or("-"));

            if let Some(interface) = describe {
                configure_with_rollback(device, &interface).await?;
            }
            Ok(())
        })
    })
    .await
}

async fn configure_with_rollback(
    device: &mut EosDevice<SshTransport>,
    interface: &str,
) -> Result<(), ferrinet::Error> {
    let checkpoint = "ferrinet_example";
    device.checkpoint(checkpoint).await?;

    let interface_cmd = format!("interface {interface}");
    let commands = [interface_cmd.as_str(), "description managed by ferrinet"];
    if let Err(e) = device.config_list(&commands).await {
        eprintln!("Configuration failed ({e}); rolling back to {checkpoint}");
        device.rollback(checkpoint).await?;
        return Err(e);
    }

    let running = device.show(&format!("show running-config interfaces {interface}")).await?;
    println!("{running}");
    Ok(())
}

struct Args {
    hosts: Vec<String>,
    port: u16,
    user: String,
    password: Option<String>,
    key: Option<PathBuf>,
    enable_secret: Option<String>,
    timeout: u64,
    describe: Option<String>,
}

impl Args {
    fn parse() -> Self {
        let args: Vec<String> = env::args().collect();
        let mut hosts = Vec::new();
        let mut port = 22u16;
        let mut user = env::var("USER").unwrap_or_else(|_| "admin".to_string());
        let mut password = None;
        let mut key = None;
        let mut enable_secret = None;
        let mut timeout = 30u64;
        let mut describe = None;

        let mut i = 1;
        while i < args.len() {
            let value = args.get(i + 1).cloned();
            match args[i].as_str() {
                "--host" | "-h" => {
                    hosts.extend(value);
                    i += 1;
                }
                "--port" | "-p" => {
                    port = value.and_then(|v| v.parse().ok()).unwrap_or(22);
                    i += 1;
                }
                "--user" | "-u" => {
                    if let Some(v) = value {
                        user = v;
                    }
                    i += 1;
                }
                "--password" | "-P" => {
                    password = value;
                    i += 1;
                }
                "--key" | "-k" => {
                    key = value.map(PathBuf::from);
                    i += 1;
                }
                "--enable-secret" | "-e" => {
                    enable_secret = value;
                    i += 1;
                }
                "--timeout" | "-t" => {
                    timeout = value.and_then(|v| v.parse().ok()).unwrap_or(30);
                    i += 1;
                }
                "--describe" | "-d" => {
                    describe = value;
                    i += 1;
                }
                "--help" => {
                    Self::print_help();
                    std::process::exit(0);
                }
                _ => {}
            }
            i += 1;
        }

        if hosts.is_empty() {
            hosts.push("localhost".to_string());
        }

        Self {
            hosts,
            port,
            user,
            password,
            key,
            enable_secret,
            timeout,
            describe,
        }
    }

    fn print_help() {
        println!(
            r#"Ferrinet Arista EOS Example

USAGE:
    cargo run --example arista_eos -- [OPTIONS]

OPTIONS:
    -h, --host <HOST>           Target host, repeatable [default: localhost]
    -p, --port <PORT>           SSH port [default: 22]
    -u, --user <USER>           Username [default: $USER]
    -P, --password <PASS>       Password
    -k, --key <PATH>            Private key file
    -e, --enable-secret <PASS>  Enable secret
    -t, --timeout <SECS>        Timeout in seconds [default: 30]
    -d, --describe <IFACE>      Set a description on IFACE under a checkpoint
        --help                  Print help
"#
        );
    }
}
