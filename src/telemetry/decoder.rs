//! # Telemetry Decoder
//!
//! Decodes CRSF telemetry payloads (Link Statistics, Battery, Attitude,
//! Flight Mode, GPS, RC Channels) into typed records.
//!
//! All multi-byte fields are big-endian, as sent by the flight controller.

use super::types::*;
use crate::crsf::protocol::*;
use crate::error::{BridgeError, Result};

/// Decode a validated frame into a telemetry record
///
/// # Returns
///
/// * `Ok(Some(record))` - the frame type is known and its payload is well-formed
/// * `Ok(None)` - the frame type has no decoder; the frame is relayed as-is
///
/// # Errors
///
/// Returns [`BridgeError::MalformedPayload`] if the payload does not match the
/// fixed layout of its frame type.
pub fn decode(frame: &CrsfFrame) -> Result<Option<TelemetryRecord>> {
    let payload = frame.payload.as_slice();

    let record = match frame.frame_type {
        CRSF_FRAMETYPE_LINK_STATISTICS => {
            TelemetryRecord::LinkStatistics(decode_link_statistics(payload)?)
        }
        CRSF_FRAMETYPE_BATTERY_SENSOR => TelemetryRecord::Battery(decode_battery_sensor(payload)?),
        CRSF_FRAMETYPE_ATTITUDE => TelemetryRecord::Attitude(decode_attitude(payload)?),
        CRSF_FRAMETYPE_FLIGHT_MODE => TelemetryRecord::FlightMode(decode_flight_mode(payload)?),
        CRSF_FRAMETYPE_GPS => TelemetryRecord::Gps(decode_gps(payload)?),
        CRSF_FRAMETYPE_RC_CHANNELS_PACKED => {
            TelemetryRecord::RcChannels(decode_rc_channels(payload)?)
        }
        _ => return Ok(None),
    };

    Ok(Some(record))
}

fn expect_len(frame_type: u8, payload: &[u8], expected: usize) -> Result<()> {
    if payload.len() != expected {
        return Err(BridgeError::MalformedPayload {
            frame_type,
            reason: format!("expected {} bytes, got {}", expected, payload.len()),
        });
    }
    Ok(())
}

/// RSSI is sent as a positive magnitude of a negative dBm value
fn rssi_dbm(raw: u8) -> i16 {
    -(raw as i16)
}

/// Decode Link Statistics telemetry packet (10 bytes)
pub fn decode_link_statistics(payload: &[u8]) -> Result<LinkStatistics> {
    expect_len(
        CRSF_FRAMETYPE_LINK_STATISTICS,
        payload,
        CRSF_LINK_STATS_PAYLOAD_SIZE,
    )?;

    Ok(LinkStatistics {
        uplink_rssi_ant1: rssi_dbm(payload[0]),
        uplink_rssi_ant2: rssi_dbm(payload[1]),
        uplink_link_quality: payload[2],
        uplink_snr: payload[3] as i8,
        active_antenna: payload[4],
        rf_mode: payload[5],
        uplink_tx_power: payload[6],
        downlink_rssi: rssi_dbm(payload[7]),
        downlink_link_quality: payload[8],
        downlink_snr: payload[9] as i8,
    })
}

/// Decode Battery Sensor telemetry packet (8 bytes)
pub fn decode_battery_sensor(payload: &[u8]) -> Result<BatterySensor> {
    expect_len(
        CRSF_FRAMETYPE_BATTERY_SENSOR,
        payload,
        CRSF_BATTERY_SENSOR_PAYLOAD_SIZE,
    )?;

    // Voltage: 2 bytes, deci-volts
    let voltage_dv = u16::from_be_bytes([payload[0], payload[1]]);

    // Current: 2 bytes, deci-amps
    let current_da = u16::from_be_bytes([payload[2], payload[3]]);

    // Capacity: 3 bytes, mAh
    let capacity_used = u32::from_be_bytes([0, payload[4], payload[5], payload[6]]);

    Ok(BatterySensor {
        voltage: voltage_dv as f32 / 10.0,
        current: current_da as f32 / 10.0,
        capacity_used,
        remaining_percent: payload[7],
    })
}

/// Decode Attitude telemetry packet (6 bytes, radians × 10000)
pub fn decode_attitude(payload: &[u8]) -> Result<Attitude> {
    expect_len(CRSF_FRAMETYPE_ATTITUDE, payload, CRSF_ATTITUDE_PAYLOAD_SIZE)?;

    let angle = |i: usize| i16::from_be_bytes([payload[i], payload[i + 1]]) as f32 / 10_000.0;

    Ok(Attitude {
        pitch: angle(0),
        roll: angle(2),
        yaw: angle(4),
    })
}

/// Decode Flight Mode telemetry packet (NUL-terminated string)
pub fn decode_flight_mode(payload: &[u8]) -> Result<FlightMode> {
    let text = payload.split(|&b| b == 0).next().unwrap_or_default();

    if text.is_empty() {
        return Err(BridgeError::MalformedPayload {
            frame_type: CRSF_FRAMETYPE_FLIGHT_MODE,
            reason: "empty flight mode".to_string(),
        });
    }

    let name = std::str::from_utf8(text).map_err(|e| BridgeError::MalformedPayload {
        frame_type: CRSF_FRAMETYPE_FLIGHT_MODE,
        reason: format!("flight mode is not UTF-8: {}", e),
    })?;

    Ok(FlightMode {
        name: name.to_string(),
    })
}

/// Decode GPS telemetry packet (15 bytes)
pub fn decode_gps(payload: &[u8]) -> Result<GpsData> {
    expect_len(CRSF_FRAMETYPE_GPS, payload, CRSF_GPS_PAYLOAD_SIZE)?;

    // Latitude / longitude: degrees × 10^7
    let lat_raw = i32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);
    let lon_raw = i32::from_be_bytes([payload[4], payload[5], payload[6], payload[7]]);

    // Ground speed: km/h × 10
    let speed_raw = u16::from_be_bytes([payload[8], payload[9]]);

    // Heading: degrees × 100
    let heading_raw = u16::from_be_bytes([payload[10], payload[11]]);

    // Altitude: meters + 1000
    let altitude_raw = u16::from_be_bytes([payload[12], payload[13]]);

    Ok(GpsData {
        latitude: lat_raw as f64 / 10_000_000.0,
        longitude: lon_raw as f64 / 10_000_000.0,
        ground_speed: speed_raw as f32 / 10.0,
        heading: heading_raw as f32 / 100.0,
        altitude: altitude_raw as i32 - 1000,
        satellites: payload[14],
    })
}

/// Decode RC Channels packet (22 bytes, 16 × 11-bit LSB-first)
pub fn decode_rc_channels(payload: &[u8]) -> Result<RcChannelsData> {
    expect_len(
        CRSF_FRAMETYPE_RC_CHANNELS_PACKED,
        payload,
        CRSF_RC_CHANNELS_PAYLOAD_SIZE,
    )?;

    let mut channels = [0u16; CRSF_NUM_CHANNELS];
    let mut bit_index = 0;

    for channel in channels.iter_mut() {
        for bit in 0..11 {
            if (payload[bit_index / 8] >> (bit_index % 8)) & 1 == 1 {
                *channel |= 1 << bit;
            }
            bit_index += 1;
        }
    }

    Ok(RcChannelsData { channels })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(frame_type: u8, payload: Vec<u8>) -> CrsfFrame {
        CrsfFrame::new(frame_type, payload).unwrap()
    }

    /// Pack 16 channels as a continuous 11-bit LSB-first bitstream
    fn pack_channels(channels: &RcChannels) -> Vec<u8> {
        let mut payload = Vec::with_capacity(CRSF_RC_CHANNELS_PAYLOAD_SIZE);
        let mut acc: u32 = 0;
        let mut bits = 0;
        for &channel in channels {
            acc |= u32::from(channel & CRSF_CHANNEL_VALUE_MAX) << bits;
            bits += 11;
            while bits >= 8 {
                payload.push(acc as u8);
                acc >>= 8;
                bits -= 8;
            }
        }
        payload
    }

    #[test]
    fn test_decode_link_statistics() {
        let payload = vec![
            100u8, // uplink_rssi_1
            95,    // uplink_rssi_2
            80,    // uplink_lq (80%)
            0xF6,  // uplink_snr (-10)
            1,     // active_antenna
            4,     // rf_mode
            2,     // uplink_tx_power
            90,    // downlink_rssi
            85,    // downlink_lq
            12,    // downlink_snr
        ];

        let stats = decode_link_statistics(&payload).unwrap();
        assert_eq!(stats.uplink_rssi_ant1, -100);
        assert_eq!(stats.uplink_rssi_ant2, -95);
        assert_eq!(stats.uplink_link_quality, 80);
        assert_eq!(stats.uplink_snr, -10);
        assert_eq!(stats.active_antenna, 1);
        assert_eq!(stats.uplink_tx_power_mw(), Some(25));
        assert_eq!(stats.downlink_rssi, -90);
        assert_eq!(stats.downlink_link_quality, 85);
        assert_eq!(stats.downlink_snr, 12);
    }

    #[test]
    fn test_decode_link_statistics_wrong_length() {
        assert!(decode_link_statistics(&[100u8; 5]).is_err());
        assert!(decode_link_statistics(&[100u8; 11]).is_err());
    }

    #[test]
    fn test_decode_battery_sensor() {
        let payload = vec![
            0x00, 0x7E, // Voltage: 126 dV
            0x00, 0x32, // Current: 50 dA
            0x00, 0x03, 0xE8, // Capacity: 1000 mAh
            0x50, // Remaining: 80%
        ];

        let battery = decode_battery_sensor(&payload).unwrap();
        assert!((battery.voltage - 12.6).abs() < 1e-4);
        assert!((battery.current - 5.0).abs() < 1e-4);
        assert_eq!(battery.capacity_used, 1000);
        assert_eq!(battery.remaining_percent, 80);
    }

    #[test]
    fn test_decode_battery_sensor_wrong_length() {
        let err = decode_battery_sensor(&[0u8; 4]).unwrap_err();
        match err {
            BridgeError::MalformedPayload { frame_type, reason } => {
                assert_eq!(frame_type, CRSF_FRAMETYPE_BATTERY_SENSOR);
                assert!(reason.contains("expected 8 bytes, got 4"));
            }
            other => panic!("Expected MalformedPayload, got: {:?}", other),
        }
    }

    #[test]
    fn test_decode_attitude() {
        let pitch: i16 = 1571; // 0.1571 rad
        let roll: i16 = -7854; // -0.7854 rad
        let yaw: i16 = 31416; // 3.1416 rad
        let mut payload = Vec::new();
        payload.extend(pitch.to_be_bytes());
        payload.extend(roll.to_be_bytes());
        payload.extend(yaw.to_be_bytes());

        let attitude = decode_attitude(&payload).unwrap();
        assert!((attitude.pitch - 0.1571).abs() < 1e-4);
        assert!((attitude.roll - (-0.7854)).abs() < 1e-4);
        assert!((attitude.yaw - 3.1416).abs() < 1e-4);
    }

    #[test]
    fn test_decode_flight_mode() {
        let mode = decode_flight_mode(b"ACRO\0").unwrap();
        assert_eq!(mode.name, "ACRO");

        // Missing terminator is tolerated
        let mode = decode_flight_mode(b"HOR").unwrap();
        assert_eq!(mode.name, "HOR");
    }

    #[test]
    fn test_decode_flight_mode_malformed() {
        assert!(decode_flight_mode(b"").is_err());
        assert!(decode_flight_mode(b"\0ACRO").is_err());
        assert!(decode_flight_mode(&[0xFF, 0xFE, 0x00]).is_err());
    }

    #[test]
    fn test_decode_gps() {
        let lat_raw: i32 = 377_749_000; // 37.7749 × 10^7
        let lon_raw: i32 = -1_224_194_000; // -122.4194 × 10^7

        let mut payload = Vec::new();
        payload.extend(lat_raw.to_be_bytes());
        payload.extend(lon_raw.to_be_bytes());
        payload.extend([0x00, 0xFF]); // 25.5 km/h
        payload.extend([0x23, 0x28]); // 90.00°
        payload.extend([0x04, 0x4C]); // 1100 - 1000 = 100 m
        payload.push(12);

        let gps = decode_gps(&payload).unwrap();
        assert!((gps.latitude - 37.7749).abs() < 0.0001);
        assert!((gps.longitude - (-122.4194)).abs() < 0.0001);
        assert!((gps.ground_speed - 25.5).abs() < 0.1);
        assert!((gps.heading - 90.0).abs() < 0.1);
        assert_eq!(gps.altitude, 100);
        assert_eq!(gps.satellites, 12);
    }

    #[test]
    fn test_decode_gps_below_offset() {
        let mut payload = vec![0u8; CRSF_GPS_PAYLOAD_SIZE];
        payload[12..14].copy_from_slice(&500u16.to_be_bytes());
        assert_eq!(decode_gps(&payload).unwrap().altitude, -500);
    }

    #[test]
    fn test_decode_gps_wrong_length() {
        assert!(decode_gps(&[0u8; 10]).is_err());
    }

    #[test]
    fn test_decode_rc_channels() {
        let mut channels = [CRSF_CHANNEL_VALUE_CENTER; CRSF_NUM_CHANNELS];
        channels[0] = 172;
        channels[3] = 1811;
        channels[15] = CRSF_CHANNEL_VALUE_MAX;

        let decoded = decode_rc_channels(&pack_channels(&channels)).unwrap();
        assert_eq!(decoded.channels, channels);
        assert_eq!(decoded.to_microseconds()[1], 1500);
    }

    #[test]
    fn test_decode_rc_channels_bit_layout() {
        // Channel 1 fills byte 0 and the low 3 bits of byte 1
        let mut payload = vec![0u8; CRSF_RC_CHANNELS_PAYLOAD_SIZE];
        payload[0] = 0xFF;
        payload[1] = 0x07;

        let decoded = decode_rc_channels(&payload).unwrap();
        assert_eq!(decoded.channels[0], 0x7FF);
        assert!(decoded.channels[1..].iter().all(|&ch| ch == 0));

        let all_ones = decode_rc_channels(&[0xFF; CRSF_RC_CHANNELS_PAYLOAD_SIZE]).unwrap();
        assert_eq!(all_ones.channels, [CRSF_CHANNEL_VALUE_MAX; CRSF_NUM_CHANNELS]);
    }

    #[test]
    fn test_decode_dispatch() {
        let record = decode(&frame(CRSF_FRAMETYPE_ATTITUDE, vec![0u8; 6])).unwrap();
        assert!(matches!(record, Some(TelemetryRecord::Attitude(_))));

        let record = decode(&frame(CRSF_FRAMETYPE_FLIGHT_MODE, b"ANGL\0".to_vec())).unwrap();
        assert_eq!(
            record,
            Some(TelemetryRecord::FlightMode(FlightMode { name: "ANGL".to_string() }))
        );
    }

    #[test]
    fn test_decode_unknown_type_is_not_an_error() {
        let record = decode(&frame(CRSF_FRAMETYPE_DEVICE_INFO, vec![0xEA, 0xEE, 1, 2, 3])).unwrap();
        assert!(record.is_none());

        let record = decode(&frame(CRSF_FRAMETYPE_HEARTBEAT, vec![0x00, 0xC8])).unwrap();
        assert!(record.is_none());
    }

    #[test]
    fn test_decode_is_deterministic() {
        let battery = frame(
            CRSF_FRAMETYPE_BATTERY_SENSOR,
            vec![0x00, 0x7E, 0x00, 0x32, 0x00, 0x03, 0xE8, 0x50],
        );
        assert_eq!(decode(&battery).unwrap(), decode(&battery).unwrap());
    }

    #[test]
    fn test_decode_malformed_known_types() {
        for frame_type in [
            CRSF_FRAMETYPE_LINK_STATISTICS,
            CRSF_FRAMETYPE_BATTERY_SENSOR,
            CRSF_FRAMETYPE_ATTITUDE,
            CRSF_FRAMETYPE_GPS,
            CRSF_FRAMETYPE_RC_CHANNELS_PACKED,
        ] {
            let result = decode(&frame(frame_type, vec![0u8; 3]));
            assert!(
                matches!(result, Err(BridgeError::MalformedPayload { .. })),
                "type 0x{:02X} should be malformed",
                frame_type
            );
        }
    }
}
