use anyhow::{anyhow, Result};
use chrono::Utc;
use sysinfo::Pid;
use tracing::instrument;
use xcb::{
    x::{
        self, Atom, Drawable, GetGeometry, GetProperty, GrabServer, InternAtom, UngrabServer,
        Window, ATOM_ANY,
    },
    Connection, Xid,
};

use super::{WindowInfo, WindowManager, WindowRect};

fn get_pid_atom(conn: &Connection) -> Result<Atom> {
    let reply = conn.wait_for_reply(conn.send_request(&InternAtom {
        only_if_exists: false,
        name: b"_NET_WM_PID",
    }))?;
    Ok(reply.atom())
}

fn get_pid(conn: &Connection, window: Window, pid_atom: Atom) -> Result<Option<u32>> {
    let result = conn.wait_for_reply(conn.send_request(&GetProperty {
        delete: false,
        window,
        property: pid_atom,
        r#type: ATOM_ANY,
        long_offset: 0,
        long_length: 1,
    }))?;
    let result_slice = result.value::<u32>();
    if result_slice.is_empty() {
        return Ok(None);
    }
    Ok(Some(result_slice[0]))
}

fn get_process_name(id: u32) -> Result<Option<String>> {
    let system = sysinfo::System::new_all();
    let Some(process) = system.process(Pid::from_u32(id)) else {
        return Ok(None);
    };

    Ok(Some(process.name().to_string_lossy().into_owned()))
}

fn get_active_window_atom(conn: &Connection) -> Result<Atom> {
    let active_window_atom = conn.wait_for_reply(conn.send_request(&InternAtom {
        only_if_exists: false,
        name: b"_NET_ACTIVE_WINDOW",
    }))?;
    Ok(active_window_atom.atom())
}

fn get_active_window(conn: &Connection, root: &Window, active_window_atom: Atom) -> Result<Window> {
    let result = conn.wait_for_reply(conn.send_request(&GetProperty {
        delete: false,
        window: *root,
        property: active_window_atom,
        r#type: ATOM_ANY,
        long_offset: 0,
        long_length: 1,
    }))?;
    let windows = result.value::<Window>();
    if windows.is_empty() {
        return Err(anyhow!("no active window is set on the root"));
    }
    Ok(windows[0])
}

fn get_net_wm_name_atom(conn: &Connection) -> Result<Atom> {
    let response = conn.wait_for_reply(conn.send_request(&InternAtom {
        only_if_exists: false,
        name: b"_NET_WM_NAME",
    }))?;
    Ok(response.atom())
}

pub fn get_name(conn: &Connection, window: Window, wm_name_atom: Atom) -> Result<String> {
    let wm_name = conn.wait_for_reply(conn.send_request(&x::GetProperty {
        delete: false,
        window,
        property: wm_name_atom,
        r#type: x::ATOM_ANY,
        long_offset: 0,
        long_length: 1024,
    }))?;
    Ok(String::from_utf8_lossy(wm_name.value()).into_owned())
}

fn get_rect(conn: &Connection, window: Window) -> Result<WindowRect> {
    let reply = conn.wait_for_reply(conn.send_request(&GetGeometry {
        drawable: Drawable::Window(window),
    }))?;
    Ok(WindowRect {
        x: reply.x() as i32,
        y: reply.y() as i32,
        width: reply.width() as u32,
        height: reply.height() as u32,
    })
}

pub struct LinuxWindowManager {
    connection: Connection,
    preferred_screen: i32,
    active_window_atom: Atom,
    window_name_atom: Atom,
    pid_atom: Atom,
}

impl LinuxWindowManager {
    pub fn new() -> Result<Self> {
        let (connection, preferred_screen) = xcb::Connection::connect(None)?;
        let active_window_atom = get_active_window_atom(&connection)?;
        let name_atom = get_net_wm_name_atom(&connection)?;
        let pid_atom = get_pid_atom(&connection)?;
        Ok(Self {
            connection,
            preferred_screen,
            active_window_atom,
            window_name_atom: name_atom,
            pid_atom,
        })
    }

    #[instrument(skip(self))]
    fn get_foreground_inner(&self) -> Result<WindowInfo> {
        let setup = self.connection.get_setup();

        // Currently the engine only supports 1 x11 screen.
        let root = setup
            .roots()
            .nth(self.preferred_screen.max(0) as usize)
            .ok_or_else(|| anyhow!("preferred x11 screen is missing"))?
            .root();

        let active_window =
            get_active_window(&self.connection, &root, self.active_window_atom)?;
        let title = get_name(&self.connection, active_window, self.window_name_atom)?;
        let pid = get_pid(&self.connection, active_window, self.pid_atom)?
            .ok_or_else(|| anyhow!("active window does not expose _NET_WM_PID"))?;
        let process_name = get_process_name(pid)?
            .ok_or_else(|| anyhow!("owning process {pid} has already exited"))?;
        let rect = get_rect(&self.connection, active_window)?;

        Ok(WindowInfo {
            handle: active_window.resource_id() as u64,
            title,
            pid,
            process_name,
            rect,
            timestamp: Utc::now(),
        })
    }
}

impl WindowManager for LinuxWindowManager {
    #[instrument(skip(self))]
    fn foreground_window(&mut self) -> Result<WindowInfo> {
        let _ = self.connection.send_request(&GrabServer {});

        let result = self.get_foreground_inner();
        let _ = self.connection.send_request(&UngrabServer {});
        result
    }
}
