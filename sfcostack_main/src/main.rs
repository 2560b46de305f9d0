// SFC-Ostack: Service Function Chains on OpenStack
// Copyright (C) 2021  Tibor Schneider
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

use ostack::OpenStack;
use sfcostack::config::{ChainConfig, LogConfig};
use sfcostack::manager::SfcManager;
use sfcostack::poll::RetryPolicy;
use sfcostack::port_chain::cleanup_steering;
use sfcostack::remote_exec::exec_on_chain;

use clap::{Parser, Subcommand};
use log::*;
use std::error::Error;
use std::path::PathBuf;

fn main() -> Result<(), Box<dyn Error>> {
    // run clap
    let args = CommandLineArguments::parse();

    let config = ChainConfig::load_file(&args.conf_path)?;
    init_logger(config.log())?;
    let config = match args.samples {
        Some(n) => {
            let mut members = config.server_chain().to_vec();
            members.extend(config.sample_members(n)?);
            config.with_server_chain(members)
        }
        None => config,
    };

    debug!("Connecting to {}", config.cloud_auth().auth_url);
    let cloud = OpenStack::connect(config.cloud_auth())?;
    let manager = SfcManager::new(cloud.clone(), config.manager());

    match args.cmd {
        MainCommand::Create { placement, reorder, wait_ready, json_filename } => {
            let (sfc, durations) = manager.create_sfc(&config, &placement, &reorder, wait_ready)?;
            for access in sfc.server_chain().remote_access_addresses()? {
                info!("{}: {}", access.member, access.address);
            }
            info!(
                "Chain {} created in {:.1}s (network: {:.1}s, compute: {:.1}s, readiness: {:.1}s, steering: {:.1}s)",
                sfc.server_chain().name(),
                durations.total().as_secs_f64(),
                durations.network_create.as_secs_f64(),
                durations.compute_create.as_secs_f64(),
                durations.readiness_wait.as_secs_f64(),
                durations.steering_create.as_secs_f64(),
            );
            if let Some(json_filename) = json_filename {
                let data_string = serde_json::to_string_pretty(&durations)?;
                std::fs::write(json_filename, data_string)?;
            }
        }
        MainCommand::Delete => {
            let mut sfc = manager.attach(&config)?;
            manager.delete_sfc(&mut sfc)?;
        }
        MainCommand::Cleanup => {
            cleanup_steering(&cloud)?;
        }
        MainCommand::Exec { command } => {
            let sfc = manager.attach(&config)?;
            let results = exec_on_chain(sfc.server_chain(), &command, &RetryPolicy::default())?;
            let failed: Vec<_> = results.iter().filter(|(_, status)| *status != 0).collect();
            if !failed.is_empty() {
                error!("`{}` failed on {} out of {} members", command, failed.len(), results.len());
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

/// Use the level of the configuration, unless `RUST_LOG` is set.
fn init_logger(log: &LogConfig) -> Result<(), Box<dyn Error>> {
    if std::env::var_os("RUST_LOG").is_some() {
        pretty_env_logger::init();
    } else {
        pretty_env_logger::formatted_builder().filter_level(log.level_filter()?).init();
    }
    Ok(())
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Deploy service function chains on OpenStack")]
struct CommandLineArguments {
    /// Path to the configuration file of the chain
    conf_path: PathBuf,
    /// Append this many members, generated from the sample server
    #[arg(short = 'n', long, global = true)]
    samples: Option<usize>,
    /// Action to perform
    #[command(subcommand)]
    cmd: MainCommand,
}

#[derive(Subcommand, Debug)]
enum MainCommand {
    /// Create the chain
    #[command(name = "create")]
    Create {
        /// Placement policy: `platform-default` or `fill-one`
        #[arg(short = 'p', long, default_value = "platform-default")]
        placement: String,
        /// Reorder policy: `identity` or `min-latency`
        #[arg(short = 'r', long, default_value = "identity")]
        reorder: String,
        /// Wait until every member sent its ready signal
        #[arg(short = 'w', long)]
        wait_ready: bool,
        /// Store the duration of each phase in a json file
        #[arg(long = "json")]
        json_filename: Option<PathBuf>,
    },
    /// Delete the steering and the servers of the chain
    #[command(name = "delete")]
    Delete,
    /// Delete all steering resources of the project
    #[command(name = "cleanup")]
    Cleanup,
    /// Execute a command on every member
    #[command(name = "exec")]
    Exec {
        /// Shell command
        command: String,
    },
}
