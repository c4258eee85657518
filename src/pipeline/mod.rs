pub mod routing; // Two-tier confidence routing for field extraction
pub mod provenance; // Fragment log, lineage graph, auditor, reporter
