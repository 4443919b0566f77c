//! Empty crate root; this package exists to host the `tests/` integration
//! suite below, which drives real `pod-agent` components end to end
//! against an in-memory coordination backend and wiremock-mocked peers.
