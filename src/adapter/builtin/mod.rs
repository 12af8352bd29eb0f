//! Worked instances of the Tool Adapter contract. Four tools are covered
//! in full, enough to exercise every parse/timeout/tool-missing code path
//! the generic `execute` helper drives; the rest of a real deployment's
//! catalogue is out of this core's scope.

mod httpx;
mod nmap;
mod nuclei;
mod subfinder;

pub use httpx::HttpxAdapter;
pub use nmap::NmapAdapter;
pub use nuclei::NucleiAdapter;
pub use subfinder::SubfinderAdapter;
