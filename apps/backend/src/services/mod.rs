pub mod session_router;
