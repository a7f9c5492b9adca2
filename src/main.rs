use atchan::ChannelBuilder;
use std::time::Duration;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let channel = ChannelBuilder::new()
        .with_serial("/dev/ttyUSB0")
        .baud(115_200)?
        .on_unsolicited(Box::new(|_chan, line| {
            println!("unsolicited: {line}");
        }))
        .open()?;

    channel.handshake(None, None, None)?;

    let resp = channel.send_singleline("AT+CSQ?", "+CSQ:", Some(Duration::from_secs(2)))?;
    println!("signal quality: {:?}", resp.intermediates());

    channel.close();
    Ok(())
}
