// Peer selection: one scan, first name match wins.

use std::time::Duration;

use crate::error::OtaError;
use crate::transport::{PeerDescriptor, Transport};

/// Pick a peer from one scan's results.
///
/// With `name_filter`, the first peer whose name contains it (ignoring case).
/// Without, the first peer whose name contains any of `markers`. Unnamed
/// peers never match. Order is scan order; signal strength is ignored.
pub fn pick_peer<'a>(
    peers: &'a [PeerDescriptor],
    name_filter: Option<&str>,
    markers: &[String],
) -> Result<&'a PeerDescriptor, OtaError> {
    let needles: Vec<String> = match name_filter {
        Some(filter) => vec![filter.to_lowercase()],
        None => markers.iter().map(|m| m.to_lowercase()).collect(),
    };

    peers
        .iter()
        .find(|peer| {
            peer.name.as_deref().is_some_and(|name| {
                let name = name.to_lowercase();
                needles.iter().any(|needle| name.contains(needle.as_str()))
            })
        })
        .ok_or_else(|| OtaError::DeviceNotFound {
            seen: peers.iter().filter_map(|p| p.name.clone()).collect(),
        })
}

/// Scan once for `scan_timeout` and pick a peer, see [`pick_peer`].
pub async fn select_peer<T: Transport + ?Sized>(
    transport: &T,
    name_filter: Option<&str>,
    scan_timeout: Duration,
    markers: &[String],
) -> Result<PeerDescriptor, OtaError> {
    match name_filter {
        Some(filter) => tlog!("[selector] Scanning for devices with name {filter}..."),
        None => tlog!("[selector] Scanning for devices..."),
    }

    let peers = transport
        .scan(scan_timeout)
        .await
        .map_err(|e| OtaError::AdapterUnavailable(e.to_string()))?;

    let peer = pick_peer(&peers, name_filter, markers)?.clone();
    tlog!("[selector] Found device: {peer}");
    Ok(peer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::OtaConfig;
    use crate::transport::mock::MockTransport;

    fn peer(id: &str, name: Option<&str>) -> PeerDescriptor {
        PeerDescriptor {
            id: id.to_string(),
            name: name.map(str::to_string),
            rssi: None,
        }
    }

    fn sample_peers() -> Vec<PeerDescriptor> {
        vec![
            peer("id-foo", Some("Foo")),
            peer("id-blind", Some("Blindomator-42")),
            peer("id-bar", Some("Bar")),
        ]
    }

    fn markers() -> Vec<String> {
        OtaConfig::default().device_markers
    }

    #[test]
    fn test_default_markers_pick_family_device() {
        let peers = sample_peers();
        let picked = pick_peer(&peers, None, &markers()).unwrap();
        assert_eq!(picked.id, "id-blind");
    }

    #[test]
    fn test_filter_no_match_reports_seen_names() {
        let peers = sample_peers();
        match pick_peer(&peers, Some("Nova"), &markers()) {
            Err(OtaError::DeviceNotFound { seen }) => {
                assert_eq!(seen, vec!["Foo", "Blindomator-42", "Bar"]);
            }
            other => panic!("expected DeviceNotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_filter_is_case_insensitive_substring() {
        let peers = sample_peers();
        let picked = pick_peer(&peers, Some("bAr"), &markers()).unwrap();
        assert_eq!(picked.id, "id-bar");
    }

    #[test]
    fn test_first_match_wins() {
        let peers = vec![
            peer("one", Some("ESP32-kitchen")),
            peer("two", Some("Blindomator-1")),
        ];
        let picked = pick_peer(&peers, None, &markers()).unwrap();
        assert_eq!(picked.id, "one");
    }

    #[test]
    fn test_unnamed_peers_ignored_and_not_listed() {
        let peers = vec![peer("anon", None), peer("foo", Some("Foo"))];
        match pick_peer(&peers, None, &markers()) {
            Err(OtaError::DeviceNotFound { seen }) => assert_eq!(seen, vec!["Foo"]),
            other => panic!("expected DeviceNotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_filter_overrides_markers() {
        // A family device is not picked when an explicit filter is given
        let peers = sample_peers();
        let picked = pick_peer(&peers, Some("foo"), &markers()).unwrap();
        assert_eq!(picked.id, "id-foo");
    }

    #[tokio::test]
    async fn test_select_peer_scans_once() {
        let transport = MockTransport::with_peers(sample_peers());
        let picked = select_peer(&transport, None, Duration::ZERO, &markers())
            .await
            .unwrap();
        assert_eq!(picked.id, "id-blind");
        assert_eq!(transport.scan_count(), 1);
    }
}
