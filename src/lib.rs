/*!
# Dekanat Console

Administrative web console for a university dean's office, built in Rust.

## Overview

The console is a thin front end over the dekanat REST backend. It lists,
searches, sorts, pages, creates, edits and deletes institutes, kafedras
(departments), students and employees, and lets administrators manage user
roles. All data lives in the backend; the console keeps only per-browser
sessions in memory.

## Architecture

### Table Pipeline
- **record**: Field paths and dynamically typed field values read from records
- **collation**: Russian-aware string ordering used by every sort
- **listview**: Search filter, stable sort and pagination over a loaded list
- **entity**: Institute, kafedra, student and employee records with their tables

### Access Control
- **session**: Logged-in identity and its single-writer lifecycle
- **gate**: Role checks, the console route table, redirects and navigation

### Forms
- **validation**: Declarative field rules and uniqueness checks

### Web Layer (`web` feature)
- **api**: Backend collaborators and their REST client
- **login**: Cookie sessions, login handlers and the access middleware
- **app**: Routing and handlers

## Configuration

Read from the environment at start-up, see [`config::Config`]:

- `DEKANAT_BIND`, `DEKANAT_PORT` - listen address (`127.0.0.1:3000`)
- `DEKANAT_API_URL` - backend root (`http://localhost:8080/api/v1/`)
- `DEKANAT_PAGE_SIZE` - rows per page (10)

## REST API Endpoints

- `GET /api/session` - Current identity and visible navigation
- `GET|POST /api/entities/{kind}` - List a table, create a record
- `GET|PUT|DELETE /api/entities/{kind}/{id}` - Read, update, delete a record
- `GET /api/job-titles` - Job titles for the employee form
- `/api/admin/users`, `/api/admin/roles`, `/api/admin/roles/{add,remove}` - Role management
*/

pub mod collation;
pub mod config;
pub mod entity;
pub mod error;
pub mod gate;
pub mod listview;
pub mod record;
pub mod session;
pub mod validation;

#[cfg(feature = "web")]
pub mod api;
#[cfg(feature = "web")]
pub mod app;
#[cfg(feature = "web")]
pub mod login;

pub use error::ConsoleError;
pub use listview::{ListPage, ListView, SortDirection, ViewState};
pub use record::{FieldPath, FieldValue, Record};
pub use session::{Session, SessionHub, UserIdentity};
