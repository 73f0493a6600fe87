use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use mavlink::{
    common::{
        MavAutopilot, MavCmd, MavFrame, MavMessage, MavModeFlag, MavParamType, MavResult,
        MavState, MavType, PositionTargetTypemask, BATTERY_STATUS_DATA, COMMAND_LONG_DATA,
        GLOBAL_POSITION_INT_DATA, HEARTBEAT_DATA, HOME_POSITION_DATA, PARAM_SET_DATA,
        SET_POSITION_TARGET_GLOBAL_INT_DATA, STATUSTEXT_DATA,
    },
    MavConnection, MavHeader,
};
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info, warn};

use fence_core::geo::Position;
use fence_core::telemetry::{BatteryStatus, TelemetrySnapshot};
use fence_core::vehicle::{FlightMode, Vehicle};

use crate::modes;
use crate::safety::CommandRateLimit;
use crate::FcConfig;

// Message ids for SET_MESSAGE_INTERVAL requests.
const MSG_ID_GLOBAL_POSITION_INT: u32 = 33;
const MSG_ID_VFR_HUD: u32 = 74;
const MSG_ID_BATTERY_STATUS: u32 = 147;

/// ArduPilot sends heartbeats at 1 Hz; this much silence means the link
/// is gone even if the transport has not errored.
const HEARTBEAT_STALE_AFTER: Duration = Duration::from_secs(10);

/// Maps a config endpoint to the scheme `mavlink::connect` expects.
pub fn mavlink_url(connection: &str) -> Result<String> {
    let (scheme, rest) = connection
        .split_once(':')
        .context("fc connection should look like scheme:address")?;
    let url = match scheme {
        // A plain udp endpoint listens; SITL and telemetry radios push to us.
        "udp" | "udpin" => format!("udpin:{}", rest),
        "udpout" => format!("udpout:{}", rest),
        "tcp" | "tcpout" => format!("tcpout:{}", rest),
        "serial" => connection.to_string(),
        other => anyhow::bail!("unsupported fc connection scheme {}", other),
    };
    Ok(url)
}

/// Splits "serial:/dev/ttyUSB0:57600" into device and baud.
pub fn serial_parts(connection: &str) -> Option<(&str, u32)> {
    let rest = connection.strip_prefix("serial:")?;
    let (dev, baud) = rest.rsplit_once(':')?;
    Some((dev, baud.parse().ok()?))
}

/// Validates an endpoint without opening it. Used by the doctor.
pub fn check_connection(connection: &str) -> Result<()> {
    let url = mavlink_url(connection)?;
    if url.starts_with("serial:") {
        let (dev, _baud) = serial_parts(connection)
            .context("serial connection should look like serial:device:baud")?;
        anyhow::ensure!(
            std::path::Path::new(dev).exists(),
            "fc serial device {} does not exist",
            dev
        );
    }
    Ok(())
}

fn command_long_data(
    target_system: u8,
    target_component: u8,
    command: MavCmd,
    params: [f32; 7],
) -> COMMAND_LONG_DATA {
    COMMAND_LONG_DATA {
        target_system,
        target_component,
        command: command.into(),
        confirmation: 0,
        param1: params[0],
        param2: params[1],
        param3: params[2],
        param4: params[3],
        param5: params[4],
        param6: params[5],
        param7: params[6],
    }
}

fn send_with(
    conn: &(dyn MavConnection<MavMessage> + Sync + Send),
    hdr: &mut MavHeader,
    msg: &MavMessage,
) -> Result<()> {
    hdr.sequence = hdr.sequence.wrapping_add(1);
    conn.send(hdr, msg).context("mavlink send")?;
    Ok(())
}

fn position_from(p: &GLOBAL_POSITION_INT_DATA) -> Position {
    Position {
        // lat/lon are degE7, relative_alt is millimeters above home
        lat: f64::from(p.lat) / 1e7,
        lon: f64::from(p.lon) / 1e7,
        alt_m: f64::from(p.relative_alt) / 1000.0,
    }
}

fn battery_from(b: &BATTERY_STATUS_DATA) -> Option<BatteryStatus> {
    // battery_remaining is percentage 0-100, -1 means invalid
    if !(0..=100).contains(&b.battery_remaining) {
        return None;
    }
    Some(BatteryStatus {
        remaining_pct: f64::from(b.battery_remaining),
        voltage_mv: f64::from(b.voltages[0]),
        current_consumed_mah: f64::from(b.current_consumed),
        energy_consumed_hj: f64::from(b.energy_consumed),
    })
}

fn home_from(h: &HOME_POSITION_DATA) -> Position {
    Position {
        lat: f64::from(h.latitude) / 1e7,
        lon: f64::from(h.longitude) / 1e7,
        // Home is the origin of the relative-altitude frame.
        alt_m: 0.0,
    }
}

fn statustext_str(s: &STATUSTEXT_DATA) -> String {
    let end = s.text.iter().position(|&b| b == 0).unwrap_or(s.text.len());
    String::from_utf8_lossy(&s.text[..end]).into_owned()
}

fn mode_from_heartbeat(hb: &HEARTBEAT_DATA) -> FlightMode {
    if hb.base_mode.contains(MavModeFlag::MAV_MODE_FLAG_CUSTOM_MODE_ENABLED) {
        modes::from_custom(hb.custom_mode)
    } else {
        FlightMode::Other(hb.custom_mode)
    }
}

/// Slow-changing vehicle facts kept apart from the telemetry snapshot.
#[derive(Debug, Clone, Default)]
pub struct VehicleState {
    pub mode: Option<FlightMode>,
    pub armed: bool,
    pub groundspeed_mps: f64,
    pub home: Option<Position>,
    pub last_heartbeat: Option<Instant>,
    pub link_lost: bool,
}

pub struct FcLink {
    conn: Box<dyn MavConnection<MavMessage> + Sync + Send>,
    hdr: Mutex<MavHeader>,
    target_sys: u8,
    target_comp: u8,
    snapshot: TelemetrySnapshot,
    state: Mutex<VehicleState>,
    limiter: Mutex<CommandRateLimit>,
    heartbeat_interval: Duration,
}

impl FcLink {
    /// Opens the link and blocks until the autopilot has proven itself:
    /// a heartbeat from the target system, telemetry streams requested,
    /// and a first position fix in hand.
    pub fn connect(cfg: &FcConfig) -> Result<Arc<Self>> {
        let url = mavlink_url(&cfg.connection)?;
        if let Some((dev, baud)) = serial_parts(&cfg.connection) {
            // quick validate device
            let _ = tokio_serial::new(dev, baud)
                .open_native_async()
                .with_context(|| format!("open fc serial device {}", dev))?;
        }
        let conn = mavlink::connect::<MavMessage>(&url)
            .with_context(|| format!("mavlink connect {}", url))?;

        let wait = Duration::from_millis(cfg.connect_timeout_ms.unwrap_or(30_000));
        let deadline = Instant::now() + wait;
        let mut hdr = MavHeader { system_id: cfg.sys_id, component_id: cfg.comp_id, sequence: 0 };

        // recv has no timeout of its own; the deadline check runs between
        // messages, so a totally silent link holds us until traffic or ctrl-c.
        info!("FC: waiting for heartbeat from system {}", cfg.target_sys);
        let first_hb = loop {
            anyhow::ensure!(
                Instant::now() < deadline,
                "no heartbeat from {} within {:?}",
                cfg.connection,
                wait
            );
            match conn.recv() {
                Ok((head, MavMessage::HEARTBEAT(hb)))
                    if head.system_id == cfg.target_sys
                        && head.component_id == cfg.target_comp =>
                {
                    break hb;
                }
                Ok(_) => {}
                Err(e) => {
                    debug!("FC: recv while waiting for heartbeat: {}", e);
                    thread::sleep(Duration::from_millis(20));
                }
            }
        };
        let mode = mode_from_heartbeat(&first_hb);
        info!("FC: heartbeat seen, autopilot in mode {}", mode);

        let interval_us = cfg.stream_interval_us.unwrap_or(1_000_000);
        for msg_id in [MSG_ID_GLOBAL_POSITION_INT, MSG_ID_VFR_HUD, MSG_ID_BATTERY_STATUS] {
            send_with(
                conn.as_ref(),
                &mut hdr,
                &MavMessage::COMMAND_LONG(command_long_data(
                    cfg.target_sys,
                    cfg.target_comp,
                    MavCmd::MAV_CMD_SET_MESSAGE_INTERVAL,
                    [msg_id as f32, interval_us as f32, 0.0, 0.0, 0.0, 0.0, 0.0],
                )),
            )?;
        }
        send_with(
            conn.as_ref(),
            &mut hdr,
            &MavMessage::COMMAND_LONG(command_long_data(
                cfg.target_sys,
                cfg.target_comp,
                MavCmd::MAV_CMD_GET_HOME_POSITION,
                [0.0; 7],
            )),
        )?;

        info!("FC: waiting for a position fix");
        let mut first_batt = None;
        let mut home = None;
        let mut groundspeed = 0.0f64;
        let first_pos = loop {
            anyhow::ensure!(
                Instant::now() < deadline,
                "no position fix from {} within {:?}",
                cfg.connection,
                wait
            );
            match conn.recv() {
                Ok((head, msg))
                    if head.system_id == cfg.target_sys
                        && head.component_id == cfg.target_comp =>
                {
                    match msg {
                        MavMessage::GLOBAL_POSITION_INT(p) => break position_from(&p),
                        MavMessage::BATTERY_STATUS(b) => {
                            if let Some(batt) = battery_from(&b) {
                                first_batt = Some(batt);
                            }
                        }
                        MavMessage::HOME_POSITION(h) => home = Some(home_from(&h)),
                        MavMessage::VFR_HUD(v) => groundspeed = f64::from(v.groundspeed),
                        _ => {}
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    debug!("FC: recv while waiting for position: {}", e);
                    thread::sleep(Duration::from_millis(20));
                }
            }
        };

        let heartbeat_hz = cfg.send_heartbeat_hz.unwrap_or(1.0).max(0.2);
        let link = Arc::new(Self {
            conn,
            hdr: Mutex::new(hdr),
            target_sys: cfg.target_sys,
            target_comp: cfg.target_comp,
            snapshot: TelemetrySnapshot::new(first_pos),
            state: Mutex::new(VehicleState {
                mode: Some(mode),
                armed: first_hb.base_mode.contains(MavModeFlag::MAV_MODE_FLAG_SAFETY_ARMED),
                groundspeed_mps: groundspeed,
                home,
                last_heartbeat: Some(Instant::now()),
                link_lost: false,
            }),
            limiter: Mutex::new(CommandRateLimit::new(Duration::from_millis(
                cfg.mode_command_interval_ms.unwrap_or(2_000),
            ))),
            heartbeat_interval: Duration::from_secs_f32(1.0 / heartbeat_hz),
        });
        if let Some(batt) = first_batt {
            link.snapshot.update_battery(batt);
        }
        link.spawn_reader()?;
        info!(
            "FC: connected to {} at ({:.6}, {:.6})",
            cfg.connection, first_pos.lat, first_pos.lon
        );
        Ok(link)
    }

    /// The blocking recv lives on its own OS thread, so dropping the async
    /// runtime never waits on a parked read.
    fn spawn_reader(self: &Arc<Self>) -> Result<()> {
        let link = self.clone();
        thread::Builder::new()
            .name("fc-reader".into())
            .spawn(move || link.reader_loop())
            .context("spawn fc reader thread")?;
        Ok(())
    }

    fn reader_loop(&self) {
        let mut last_hb_send: Option<Instant> = None;
        let mut consecutive_errors = 0u32;
        loop {
            if last_hb_send.map_or(true, |t| t.elapsed() >= self.heartbeat_interval) {
                if let Err(e) = self.send_heartbeat() {
                    warn!("FC: heartbeat send failed: {}", e);
                }
                last_hb_send = Some(Instant::now());
            }
            match self.conn.recv() {
                Ok((head, msg)) => {
                    consecutive_errors = 0;
                    if head.system_id == self.target_sys && head.component_id == self.target_comp {
                        self.handle_message(&msg);
                    }
                }
                Err(e) => {
                    consecutive_errors += 1;
                    if consecutive_errors >= 5 {
                        warn!("FC: link lost after {} read failures: {}", consecutive_errors, e);
                        self.state.lock().unwrap().link_lost = true;
                        return;
                    }
                    debug!("FC: recv error: {}", e);
                    thread::sleep(Duration::from_millis(20));
                }
            }
        }
    }

    fn handle_message(&self, msg: &MavMessage) {
        match msg {
            MavMessage::HEARTBEAT(hb) => {
                let mut state = self.state.lock().unwrap();
                state.mode = Some(mode_from_heartbeat(hb));
                state.armed = hb.base_mode.contains(MavModeFlag::MAV_MODE_FLAG_SAFETY_ARMED);
                state.last_heartbeat = Some(Instant::now());
            }
            MavMessage::GLOBAL_POSITION_INT(p) => {
                self.snapshot.update_position(position_from(p));
            }
            MavMessage::BATTERY_STATUS(b) => {
                if let Some(batt) = battery_from(b) {
                    self.snapshot.update_battery(batt);
                }
            }
            MavMessage::VFR_HUD(v) => {
                self.state.lock().unwrap().groundspeed_mps = f64::from(v.groundspeed);
            }
            MavMessage::HOME_POSITION(h) => {
                let fix = home_from(h);
                let mut state = self.state.lock().unwrap();
                if state.home.is_none() {
                    info!("FC: home fix at ({:.6}, {:.6})", fix.lat, fix.lon);
                }
                state.home = Some(fix);
            }
            MavMessage::STATUSTEXT(s) => info!("FC: {}", statustext_str(s)),
            MavMessage::COMMAND_ACK(ack) => {
                if ack.result == MavResult::MAV_RESULT_ACCEPTED {
                    debug!("FC: command {:?} accepted", ack.command);
                } else {
                    warn!("FC: command {:?} result {:?}", ack.command, ack.result);
                }
            }
            _ => {}
        }
    }

    fn send(&self, msg: MavMessage) -> Result<()> {
        let mut hdr = self.hdr.lock().unwrap();
        send_with(self.conn.as_ref(), &mut hdr, &msg)
    }

    pub fn send_heartbeat(&self) -> Result<()> {
        let hb = HEARTBEAT_DATA {
            custom_mode: 0,
            mavtype: MavType::MAV_TYPE_GCS,
            autopilot: MavAutopilot::MAV_AUTOPILOT_INVALID,
            base_mode: MavModeFlag::MAV_MODE_FLAG_CUSTOM_MODE_ENABLED,
            system_status: MavState::MAV_STATE_ACTIVE,
            mavlink_version: 3,
        };
        self.send(MavMessage::HEARTBEAT(hb))
    }

    pub fn set_mode(&self, mode: FlightMode) -> Result<()> {
        if !self.limiter.lock().unwrap().allow_mode_cmd() {
            warn!("FC: mode command rate-limited, {} not sent", mode);
            return Ok(());
        }
        info!("FC: mode -> {}", mode);
        let cmd = command_long_data(
            self.target_sys,
            self.target_comp,
            MavCmd::MAV_CMD_DO_SET_MODE,
            [
                f32::from(MavModeFlag::MAV_MODE_FLAG_CUSTOM_MODE_ENABLED.bits()),
                modes::to_custom(mode) as f32,
                0.0,
                0.0,
                0.0,
                0.0,
                0.0,
            ],
        );
        self.send(MavMessage::COMMAND_LONG(cmd))
    }

    pub fn arm(&self) -> Result<()> {
        info!("FC: arming");
        let cmd = command_long_data(
            self.target_sys,
            self.target_comp,
            MavCmd::MAV_CMD_COMPONENT_ARM_DISARM,
            [1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
        );
        self.send(MavMessage::COMMAND_LONG(cmd))
    }

    pub fn takeoff(&self, alt_m: f32) -> Result<()> {
        info!("FC: takeoff to {:.1} m", alt_m);
        let cmd = command_long_data(
            self.target_sys,
            self.target_comp,
            MavCmd::MAV_CMD_NAV_TAKEOFF,
            [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, alt_m],
        );
        self.send(MavMessage::COMMAND_LONG(cmd))
    }

    pub fn request_home(&self) -> Result<()> {
        debug!("FC: requesting home position");
        let cmd = command_long_data(
            self.target_sys,
            self.target_comp,
            MavCmd::MAV_CMD_GET_HOME_POSITION,
            [0.0; 7],
        );
        self.send(MavMessage::COMMAND_LONG(cmd))
    }

    pub fn set_param(&self, name: &str, value: f32) -> Result<()> {
        let mut param_id = [0u8; 16];
        for (dst, src) in param_id.iter_mut().zip(name.bytes()) {
            *dst = src;
        }
        info!("FC: param {} = {}", name, value);
        let msg = PARAM_SET_DATA {
            param_value: value,
            target_system: self.target_sys,
            target_component: self.target_comp,
            param_id,
            param_type: MavParamType::MAV_PARAM_TYPE_REAL32,
        };
        self.send(MavMessage::PARAM_SET(msg))
    }

    /// Position-only guided target; velocity, acceleration and yaw ignored.
    pub fn goto_position(&self, target: Position) -> Result<()> {
        info!(
            "FC: goto ({:.6}, {:.6}) at {:.1} m",
            target.lat, target.lon, target.alt_m
        );
        let msg = SET_POSITION_TARGET_GLOBAL_INT_DATA {
            time_boot_ms: 0,
            lat_int: (target.lat * 1e7) as i32,
            lon_int: (target.lon * 1e7) as i32,
            alt: target.alt_m as f32,
            vx: 0.0,
            vy: 0.0,
            vz: 0.0,
            afx: 0.0,
            afy: 0.0,
            afz: 0.0,
            yaw: 0.0,
            yaw_rate: 0.0,
            type_mask: PositionTargetTypemask::from_bits_truncate(0x0DF8),
            target_system: self.target_sys,
            target_component: self.target_comp,
            coordinate_frame: MavFrame::MAV_FRAME_GLOBAL_RELATIVE_ALT_INT,
        };
        self.send(MavMessage::SET_POSITION_TARGET_GLOBAL_INT(msg))
    }

    pub fn vehicle_state(&self) -> VehicleState {
        self.state.lock().unwrap().clone()
    }

    pub fn link_lost(&self) -> bool {
        self.state.lock().unwrap().link_lost
    }
}

impl Vehicle for FcLink {
    fn current_position(&self) -> Position {
        self.snapshot.current_position()
    }

    fn home_position(&self) -> Result<Position> {
        self.state.lock().unwrap().home.context("no home fix from the autopilot yet")
    }

    fn latest_battery(&self) -> Option<BatteryStatus> {
        self.snapshot.latest_battery()
    }

    fn current_mode(&self) -> FlightMode {
        // connect() saw a heartbeat, so the mode is known from then on.
        self.state.lock().unwrap().mode.unwrap_or(FlightMode::Other(u32::MAX))
    }

    fn is_armed(&self) -> bool {
        self.state.lock().unwrap().armed
    }

    fn groundspeed_mps(&self) -> f64 {
        self.state.lock().unwrap().groundspeed_mps
    }

    fn check_link(&self) -> Result<()> {
        let state = self.state.lock().unwrap();
        anyhow::ensure!(!state.link_lost, "fc link lost");
        if let Some(seen) = state.last_heartbeat {
            anyhow::ensure!(
                seen.elapsed() < HEARTBEAT_STALE_AFTER,
                "no heartbeat from the autopilot for {:?}",
                seen.elapsed()
            );
        }
        Ok(())
    }

    fn set_mode(&self, mode: FlightMode) -> Result<()> {
        FcLink::set_mode(self, mode)
    }
}
