//! Web-grounded question answering: search the web, scrape and rank the
//! results, and generate a cited answer over the retrieved context.

pub mod core;
pub mod llm;
pub mod logging;
pub mod pipeline;
pub mod prompt;
pub mod rag;
pub mod scraper;
pub mod search;
pub mod server;
pub mod state;
