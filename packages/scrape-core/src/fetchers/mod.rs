pub mod browser;
pub mod impersonate;
pub mod plain;

pub use browser::{BrowserContext, BrowserRenderer, BrowserSessionResult, HumanizationOptions, PageInstruction, Snapshot, Traversal, WaitUntil};
pub use impersonate::{ImpersonatingFetcher, ImpersonationProfile};
pub use plain::{FetchRequest, FetchResponse, Fetcher, PlainFetcher};
