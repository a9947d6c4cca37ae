use anyhow::{Context, Result};

use rgb_link::{Command, Packet, PacketPool, parse};

use crate::cli::{DecodeOpts, EncodeOpts};

pub fn encode(opts: EncodeOpts) -> Result<()> {
    let command = Command::from_name(&opts.command);
    let pool = PacketPool::new(1);
    let pkt = Packet::create(&pool, command, &opts.params, opts.msg)
        .with_context(|| format!("building {} frame", opts.command))?;
    println!("{}", String::from_utf8_lossy(pkt.frame()));
    Ok(())
}

pub fn decode(opts: DecodeOpts) -> Result<()> {
    let frame = parse(opts.frame.trim_end().as_bytes())
        .with_context(|| format!("decoding '{}'", opts.frame))?;
    println!("command={} msg={}", frame.command, frame.msg_num);
    for p in frame.params() {
        println!("  {}={}", p.key, p.value);
    }
    Ok(())
}
