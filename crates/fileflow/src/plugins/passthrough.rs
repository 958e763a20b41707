use crate::file::ManagedFile;
use crate::plugin::{NoParams, Plugin, PluginError};
use crate::status::FileProcess;

/// Identity step. Useful as a placeholder and for wiring tests.
pub struct Passthrough;

impl Plugin for Passthrough {
    type Params = NoParams;

    fn name(&self) -> &str {
        "Passthrough"
    }

    fn process(
        &self,
        files: Vec<ManagedFile>,
        _params: &NoParams,
        process: &mut FileProcess,
    ) -> Result<Vec<ManagedFile>, PluginError> {
        super::report(process, self.name(), format!("Passing through {} file(s)", files.len()));
        Ok(files)
    }
}
