use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "intercom")]
#[command(about = "Drive the intercom request/notification bus in-process")]
#[command(version)]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug, -vvv trace)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Print the effective configuration as JSON
	Config {
		/// Configuration file (defaults apply when absent)
		#[arg(short, long, value_name = "FILE")]
		config: Option<PathBuf>,
	},

	/// Run a privileged context, one relay and a page, and print what the page receives
	#[command(alias = "sim")]
	Simulate {
		#[arg(short, long, value_name = "FILE")]
		config: Option<PathBuf>,

		/// Page requests to issue concurrently
		#[arg(short = 'n', long, default_value = "3")]
		requests: usize,

		/// Notification kind to broadcast after the requests (repeatable)
		#[arg(long = "notify", value_name = "KIND")]
		notify: Vec<String>,

		/// Also issue a request whose capability fails
		#[arg(long)]
		fail: bool,
	},
}
