use serde::Deserialize;
use serde_json::{Map, Value};

pub const DNA_SUFFIX: &str = "_dna.json";
pub const DRYRUN_SUFFIX: &str = "_DRYRUN.json";
pub const DEFAULT_DATASET: &str = "squad_cqa_hs_wg_arc_mmlu";
pub const DEFAULT_OUT_DIR: &str = "dna-out";

/// One `*_dna.json` extraction output. Only the fields the build uses.
#[derive(Deserialize)]
pub struct RawDna {
    #[serde(default)]
    pub signature: Option<Vec<f64>>,
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
}
