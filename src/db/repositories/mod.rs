mod activities;
mod sessions;
