/// Interconnect used by a transport layer, interface or camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportLayerType {
    Unknown,
    GigE,
    CameraLink,
    Iidc,
    Uvc,
    CoaXPress,
    CameraLinkHs,
    U3v,
    Ethernet,
    Pci,
    Custom,
    Mixed,
}

impl TransportLayerType {
    pub fn from_code(code: u32) -> Self {
        use TransportLayerType::*;
        match code {
            1 => GigE,
            2 => CameraLink,
            3 => Iidc,
            4 => Uvc,
            5 => CoaXPress,
            6 => CameraLinkHs,
            7 => U3v,
            8 => Ethernet,
            9 => Pci,
            10 => Custom,
            11 => Mixed,
            _ => Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        use TransportLayerType::*;
        match self {
            GigE => "GigE",
            CameraLink => "Camera Link",
            Iidc => "IIDC 1394",
            Uvc => "USB video class",
            CoaXPress => "CoaXPress",
            CameraLinkHs => "Camera Link HS",
            U3v => "USB3 Vision Standard",
            Ethernet => "Generic Ethernet",
            Pci => "PCI / PCIe",
            Custom => "Non standard",
            Mixed => "Mixed (transport layer only)",
            Unknown => "Unknown",
        }
    }
}

impl std::fmt::Display for TransportLayerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_codes() {
        assert_eq!(TransportLayerType::from_code(1).as_str(), "GigE");
        assert_eq!(
            TransportLayerType::from_code(7).as_str(),
            "USB3 Vision Standard"
        );
        assert_eq!(TransportLayerType::from_code(9).to_string(), "PCI / PCIe");
        assert_eq!(
            TransportLayerType::from_code(11).as_str(),
            "Mixed (transport layer only)"
        );
    }

    #[test]
    fn unlisted_codes_are_unknown() {
        assert_eq!(TransportLayerType::from_code(0), TransportLayerType::Unknown);
        assert_eq!(TransportLayerType::from_code(12), TransportLayerType::Unknown);
        assert_eq!(TransportLayerType::from_code(u32::MAX).as_str(), "Unknown");
    }
}
