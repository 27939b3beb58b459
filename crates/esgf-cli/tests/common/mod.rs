use std::path::Path;
use std::process::{Command, Output};

use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

pub const DATASETS: [&str; 3] = [
    "CMIP6.CMIP.NCAR.CESM2.historical.r1i1p1f1.Amon.tas.gn.v20190308",
    "CMIP6.CMIP.NCAR.CESM2.historical.r2i1p1f1.Amon.tas.gn.v20190308",
    "CMIP6.ScenarioMIP.NCAR.CESM2.ssp585.r1i1p1f1.Amon.tas.gn.v20190730",
];

/// Run the CLI against `node`, keeping all state under `home`.
pub fn run_cli_with_env(args: &[&str], home: &Path, node: &str) -> Output {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_esgf"));
    cmd.args(args);
    cmd.env("HOME", home);
    cmd.env("XDG_CONFIG_HOME", home.join("config"));
    cmd.env("XDG_DATA_HOME", home.join("data"));
    cmd.env("ESGF_CONFIG", home.join("config.json"));
    cmd.env("ESGF_DATA_DIR", home.join("esgf"));
    cmd.env("ESGF_INDEX_NODE", node);
    cmd.env("NO_COLOR", "1");
    cmd.env_remove("ESGF_NODES_FILE");
    cmd.env_remove("ESGF_TRUST_ROOTS_URL");
    cmd.env_remove("RUST_LOG");
    cmd.output().expect("Failed to execute CLI")
}

/// Run the CLI and expect success.
pub fn run_cli_with_env_success(args: &[&str], home: &Path, node: &str) -> String {
    let output = run_cli_with_env(args, home, node);
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        panic!("CLI command failed: {:?}\nstderr: {}", args, stderr);
    }
    String::from_utf8_lossy(&output.stdout).to_string()
}

/// Answers search requests the way an ESGF index node does.
struct Index;

impl Respond for Index {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let docs: Vec<Value> = match param(request, "type").as_deref() {
            Some("File") => match param(request, "dataset_id") {
                Some(dataset_id) => files(&dataset_id),
                None => Vec::new(),
            },
            _ => DATASETS
                .iter()
                .filter(|id| match param(request, "instance_id") {
                    Some(instance_id) => **id == instance_id,
                    None => true,
                })
                .filter(|id| match param(request, "experiment") {
                    Some(experiment) => id.contains(&format!(".{}.", experiment)),
                    None => true,
                })
                .map(|id| dataset(id))
                .collect(),
        };

        let total = docs.len();
        let offset: usize = param(request, "offset")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let limit: usize = param(request, "limit")
            .and_then(|v| v.parse().ok())
            .unwrap_or(10);
        let page: Vec<Value> = docs.into_iter().skip(offset).take(limit).collect();

        let mut body = json!({
            "response": {"numFound": total, "start": offset, "docs": page}
        });
        if param(request, "facets").is_some() {
            body["facet_counts"] = json!({
                "facet_fields": {
                    "experiment": ["historical", 2, "ssp585", 1]
                }
            });
        }
        ResponseTemplate::new(200).set_body_json(body)
    }
}

fn param(request: &Request, name: &str) -> Option<String> {
    request
        .url
        .query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}

fn dataset(instance_id: &str) -> Value {
    let experiment = instance_id.split('.').nth(4).unwrap_or_default();
    json!({
        "id": format!("{}|esgf-data.ucar.edu", instance_id),
        "instance_id": instance_id,
        "project": ["CMIP6"],
        "experiment": [experiment],
        "variable": ["tas"],
        "type": "Dataset",
    })
}

fn files(dataset_id: &str) -> Vec<Value> {
    (1..=2)
        .map(|i| {
            let name = format!("tas_Amon_CESM2_{}.nc", i);
            json!({
                "id": format!("{}.{}", dataset_id, name),
                "dataset_id": dataset_id,
                "title": name,
                "size": 100 * i,
                "type": "File",
                "url": [format!("https://esgf-data.ucar.edu/thredds/fileServer/{}|application/netcdf|HTTPServer", name)],
            })
        })
        .collect()
}

/// Start a mock index node and return its node URL.
pub async fn index_node() -> (MockServer, String) {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/esg-search/search"))
        .respond_with(Index)
        .mount(&server)
        .await;
    let node = format!("{}/esg-search", server.uri());
    (server, node)
}
