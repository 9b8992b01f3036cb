use bollard::models::DeviceRequest;
use serde::{Deserialize, Serialize};

/// Which GPUs the container may use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GpuSelector {
    /// Explicit device indices or UUIDs, e.g. `["1"]`
    Devices(Vec<String>),
    /// Every GPU the NVIDIA runtime exposes (`"all"`)
    All(AllGpus),
}

/// Marker for the literal `all` in profile files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AllGpus {
    All,
}

impl GpuSelector {
    pub fn device(index: u32) -> Self {
        GpuSelector::Devices(vec![index.to_string()])
    }

    /// Value for `docker run --gpus`. The CLI splits this value on commas,
    /// so a device list has to be wrapped in double quotes.
    pub fn cli_value(&self) -> String {
        match self {
            GpuSelector::All(_) => "all".to_string(),
            GpuSelector::Devices(ids) if ids.len() > 1 => format!("\"device={}\"", ids.join(",")),
            GpuSelector::Devices(ids) => format!("device={}", ids.join(",")),
        }
    }

    /// Engine API form of `--gpus`.
    pub fn device_request(&self) -> DeviceRequest {
        let (count, device_ids) = match self {
            GpuSelector::All(_) => (Some(-1), None),
            GpuSelector::Devices(ids) => (None, Some(ids.clone())),
        };

        DeviceRequest {
            driver: Some("nvidia".to_string()),
            count,
            device_ids,
            capabilities: Some(vec![vec!["gpu".to_string()]]),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_device_renders_like_docker_cli() {
        let gpu = GpuSelector::device(1);
        assert_eq!(gpu.cli_value(), "device=1");

        let req = gpu.device_request();
        assert_eq!(req.device_ids, Some(vec!["1".to_string()]));
        assert_eq!(req.count, None);
        assert_eq!(req.driver.as_deref(), Some("nvidia"));
    }

    #[test]
    fn all_requests_every_device() {
        let gpu: GpuSelector = serde_yaml::from_str("all").unwrap();
        assert_eq!(gpu.cli_value(), "all");
        assert_eq!(gpu.device_request().count, Some(-1));
    }

    #[test]
    fn device_list_from_yaml() {
        let gpu: GpuSelector = serde_yaml::from_str("[\"0\", \"2\"]").unwrap();
        assert_eq!(gpu.cli_value(), "\"device=0,2\"");
    }
}
