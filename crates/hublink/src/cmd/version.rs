use hublink_frame::{DEFAULT_MAX_PAYLOAD, MAGIC};

use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("hublink {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: hublink");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!("target: {}", env!("HUBLINK_BUILD_TARGET"));
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!("git_hash: {}", option_env!("GIT_HASH").unwrap_or("unknown"));
    println!("frame_magic: 0x{MAGIC:08x}");
    println!("max_payload: {DEFAULT_MAX_PAYLOAD}");

    Ok(SUCCESS)
}
