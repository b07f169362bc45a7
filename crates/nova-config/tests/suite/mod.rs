mod diagnostics;
mod discovery;
