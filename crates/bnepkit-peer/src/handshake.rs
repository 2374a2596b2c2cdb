//! Setup request validation.

use bnepkit_frame::{ServiceClass, SetupResponseCode};
use bnepkit_transport::endian::read_u16_be;
use tracing::warn;

/// Bytes 4..16 of the Bluetooth base UUID `0000xxxx-0000-1000-8000-00805F9B34FB`.
const BASE_UUID_SUFFIX: [u8; 12] = [
    0x00, 0x00, 0x10, 0x00, 0x80, 0x00, 0x00, 0x80, 0x5F, 0x9B, 0x34, 0xFB,
];

/// Outcome of evaluating a received setup request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetupDecision {
    /// Response code to send back.
    pub code: SetupResponseCode,
    /// 16-bit destination role, `0` for anything that is not a PAN role.
    /// `None` when the UUIDs were rejected before they were read.
    pub dest_uuid: Option<u16>,
    pub source_uuid: Option<u16>,
    /// Registered service whose handler now owns the channel.
    pub service: Option<ServiceClass>,
}

impl SetupDecision {
    fn reject(code: SetupResponseCode) -> Self {
        Self {
            code,
            dest_uuid: None,
            source_uuid: None,
            service: None,
        }
    }
}

/// Validate the UUIDs of a setup request against the local services.
///
/// `dest` and `source` are the raw big-endian UUIDs, `uuid_size` bytes each.
/// When both the destination and source checks fail, the source failure is
/// reported.
pub fn evaluate_setup_request(
    uuid_size: u8,
    dest: &[u8],
    source: &[u8],
    is_registered: impl Fn(ServiceClass) -> bool,
) -> SetupDecision {
    let offset = match uuid_size {
        2 => 0,
        4 | 16 => 2,
        _ => {
            warn!(uuid_size, "setup request with invalid uuid size");
            return SetupDecision::reject(SetupResponseCode::INVALID_SERVICE_UUID_SIZE);
        }
    };
    let size = uuid_size as usize;
    if dest.len() < size || source.len() < size {
        return SetupDecision::reject(SetupResponseCode::INVALID_SERVICE_UUID_SIZE);
    }

    let mut code = SetupResponseCode::SUCCESS;
    if size > 2 {
        if read_u16_be(dest, 0) != Some(0) {
            code = SetupResponseCode::INVALID_DEST_UUID;
        }
        if read_u16_be(source, 0) != Some(0) {
            code = SetupResponseCode::INVALID_SOURCE_UUID;
        }
    }
    if size == 16 {
        if dest[4..16] != BASE_UUID_SUFFIX {
            code = SetupResponseCode::INVALID_DEST_UUID;
        }
        if source[4..16] != BASE_UUID_SUFFIX {
            code = SetupResponseCode::INVALID_SOURCE_UUID;
        }
    }
    if !code.is_success() {
        return SetupDecision::reject(code);
    }

    let dest_role = read_u16_be(dest, offset).and_then(ServiceClass::from_uuid16);
    let source_role = read_u16_be(source, offset).and_then(ServiceClass::from_uuid16);
    if dest_role.is_none() {
        warn!(uuid = ?read_u16_be(dest, offset), "setup request for unknown destination role");
    }
    if source_role.is_none() {
        warn!(uuid = ?read_u16_be(source, offset), "setup request from unknown source role");
    }

    let service = dest_role.filter(|role| is_registered(*role));
    let panu_involved = [dest_role, source_role].contains(&Some(ServiceClass::Panu));
    let code = match service {
        None => SetupResponseCode::INVALID_DEST_UUID,
        Some(_) if !panu_involved => SetupResponseCode::INVALID_SOURCE_UUID,
        Some(_) => SetupResponseCode::SUCCESS,
    };

    SetupDecision {
        code,
        dest_uuid: Some(dest_role.map_or(0, ServiceClass::uuid16)),
        source_uuid: Some(source_role.map_or(0, ServiceClass::uuid16)),
        service,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uuid128(short: u16) -> Vec<u8> {
        let mut uuid = vec![0, 0];
        uuid.extend_from_slice(&short.to_be_bytes());
        uuid.extend_from_slice(&BASE_UUID_SUFFIX);
        uuid
    }

    fn only_nap(role: ServiceClass) -> bool {
        role == ServiceClass::Nap
    }

    #[test]
    fn panu_to_nap_succeeds() {
        let decision = evaluate_setup_request(2, &[0x11, 0x16], &[0x11, 0x15], only_nap);
        assert_eq!(decision.code, SetupResponseCode::SUCCESS);
        assert_eq!(decision.dest_uuid, Some(0x1116));
        assert_eq!(decision.source_uuid, Some(0x1115));
        assert_eq!(decision.service, Some(ServiceClass::Nap));
    }

    #[test]
    fn nap_to_nap_is_invalid_source() {
        let decision = evaluate_setup_request(2, &[0x11, 0x16], &[0x11, 0x16], only_nap);
        assert_eq!(decision.code, SetupResponseCode::INVALID_SOURCE_UUID);
        assert_eq!(decision.service, Some(ServiceClass::Nap));
    }

    #[test]
    fn panu_destination_accepts_any_known_source() {
        let only_panu = |role: ServiceClass| role == ServiceClass::Panu;
        let decision = evaluate_setup_request(2, &[0x11, 0x15], &[0x11, 0x16], only_panu);
        assert_eq!(decision.code, SetupResponseCode::SUCCESS);
        assert_eq!(decision.service, Some(ServiceClass::Panu));
    }

    #[test]
    fn unregistered_destination() {
        let decision = evaluate_setup_request(2, &[0x11, 0x17], &[0x11, 0x15], only_nap);
        assert_eq!(decision.code, SetupResponseCode::INVALID_DEST_UUID);
        assert_eq!(decision.service, None);

        let decision = evaluate_setup_request(2, &[0x12, 0x34], &[0x11, 0x15], |_| true);
        assert_eq!(decision.code, SetupResponseCode::INVALID_DEST_UUID);
        assert_eq!(decision.dest_uuid, Some(0));
    }

    #[test]
    fn unknown_source_maps_to_zero() {
        let decision = evaluate_setup_request(2, &[0x11, 0x15], &[0xAB, 0xCD], |_| true);
        assert_eq!(decision.code, SetupResponseCode::SUCCESS);
        assert_eq!(decision.source_uuid, Some(0));
    }

    #[test]
    fn invalid_size() {
        let decision = evaluate_setup_request(3, &[0; 3], &[0; 3], |_| true);
        assert_eq!(decision.code, SetupResponseCode::INVALID_SERVICE_UUID_SIZE);
        assert_eq!(decision.dest_uuid, None);
    }

    #[test]
    fn uuid32_prefix_checks() {
        let ok = evaluate_setup_request(4, &[0, 0, 0x11, 0x16], &[0, 0, 0x11, 0x15], only_nap);
        assert_eq!(ok.code, SetupResponseCode::SUCCESS);

        let bad_dest =
            evaluate_setup_request(4, &[0, 1, 0x11, 0x16], &[0, 0, 0x11, 0x15], only_nap);
        assert_eq!(bad_dest.code, SetupResponseCode::INVALID_DEST_UUID);

        let both = evaluate_setup_request(4, &[0, 1, 0x11, 0x16], &[1, 0, 0x11, 0x15], only_nap);
        assert_eq!(both.code, SetupResponseCode::INVALID_SOURCE_UUID);
    }

    #[test]
    fn uuid128_base_suffix() {
        let ok = evaluate_setup_request(16, &uuid128(0x1116), &uuid128(0x1115), only_nap);
        assert_eq!(ok.code, SetupResponseCode::SUCCESS);
        assert_eq!(ok.dest_uuid, Some(0x1116));

        let mut vendor = uuid128(0x1116);
        vendor[15] = 0x00;
        let bad = evaluate_setup_request(16, &vendor, &uuid128(0x1115), only_nap);
        assert_eq!(bad.code, SetupResponseCode::INVALID_DEST_UUID);
    }
}
