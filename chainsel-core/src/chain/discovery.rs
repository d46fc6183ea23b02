//! Rack discovery: a stateless scan of the peer for chain-capable
//! devices.

use log::warn;
use rosc::OscType;

use chainsel_osc::{OscClient, RequestError};
use chainsel_types::RackDevice;

use super::{int_arg, string_arg};

pub const NUM_TRACKS_ADDR: &str = "/live/song/get/num_tracks";
pub const TRACK_NAME_ADDR: &str = "/live/track/get/name";
pub const CAN_HAVE_CHAINS_ADDR: &str = "/live/track/get/devices/can_have_chains";
pub const DEVICE_NAMES_ADDR: &str = "/live/track/get/devices/name";

/// Scan every track for devices that can hold chains.
///
/// Failures degrade: an unreachable peer yields an empty list plus a log
/// line, and a failing track is skipped rather than aborting the scan.
pub fn discover(osc: &mut OscClient) -> Vec<RackDevice> {
    let mut racks = Vec::new();

    let num_tracks = match osc.request(NUM_TRACKS_ADDR, vec![]) {
        Ok(msg) => msg.args.first().map(int_arg).unwrap_or(0),
        Err(e) => {
            warn!(target: "discovery", "track count query failed: {}", e);
            return racks;
        }
    };

    for track_id in 0..num_tracks {
        let ids = vec![OscType::Int(track_id)];
        osc.send(TRACK_NAME_ADDR, ids.clone());
        osc.send(CAN_HAVE_CHAINS_ADDR, ids.clone());
        osc.send(DEVICE_NAMES_ADDR, ids);

        let collected = (|| {
            let name = osc.wait_for(TRACK_NAME_ADDR)?;
            let chains = osc.wait_for(CAN_HAVE_CHAINS_ADDR)?;
            let devices = osc.wait_for(DEVICE_NAMES_ADDR)?;
            Ok::<_, RequestError>((name, chains, devices))
        })();
        let (name_msg, chains_msg, devices_msg) = match collected {
            Ok(msgs) => msgs,
            Err(e) => {
                warn!(target: "discovery", "skipping track {}: {}", track_id, e);
                continue;
            }
        };

        // Replies carry [track_id, values...].
        let track_name = name_msg
            .args
            .get(1)
            .map(string_arg)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| format!("Track {}", track_id));

        let can_have: Vec<i32> = chains_msg.args.iter().skip(1).map(int_arg).collect();
        for (device_id, flag) in can_have.iter().enumerate() {
            if *flag == 0 {
                continue;
            }
            let device_name = devices_msg
                .args
                .get(1 + device_id)
                .map(string_arg)
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| format!("Device {}", device_id));
            racks.push(RackDevice {
                track_id,
                track_name: track_name.clone(),
                device_id: device_id as i32,
                device_name,
            });
        }
    }

    racks
}
