mod fetch;
mod orchestrator;
