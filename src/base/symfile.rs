//! Reading and writing of symbol files.
//!
//! A symbol file is the exported interface of a module: a header with the
//! module name and a 32-bit key, then one record per exported object,
//! terminated by a class byte of 0. Types are shared inside the file
//! through reference numbers: a positive number introduces a type, a
//! negative one refers back to it. The key is the wrapping sum of the
//! file's words and lets importers detect interface drift.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use crate::error::HostError;
use crate::files;

use super::{Base, Class, Form, ObjId, Object, Type, TypId, MAX_TYP_TAB, VERSION_KEY};

impl Base {
    /// Finds or inserts a module object in the top scope. `decl` says the
    /// module is named in the import list (as opposed to being mentioned by
    /// a re-exported type).
    fn this_module(&mut self, name: &str, org_name: &str, decl: bool, key: i32) -> ObjId {
        let mut obj1 = self.top_scope;
        let mut obj = self.obj(obj1).next;
        while let Some(o) = obj {
            if self.obj(o).org_name == org_name {
                break;
            }
            obj1 = o;
            obj = self.obj(o).next;
        }
        match obj {
            None => {
                // new module; check the alias is free
                let mut alias = self.obj(self.top_scope).next;
                while let Some(o) = alias {
                    if self.obj(o).name == name {
                        break;
                    }
                    alias = self.obj(o).next;
                }
                match alias {
                    None => {
                        let typ = if decl { self.no_typ } else { self.nil_typ };
                        let mut m = Object::new(name, Class::Mod, typ);
                        m.org_name = org_name.to_string();
                        m.val = key;
                        m.lev = self.nof_mod;
                        self.nof_mod += 1;
                        let id = self.alloc_obj(m);
                        self.obj_mut(obj1).next = Some(id);
                        id
                    }
                    Some(a) => {
                        if decl {
                            if self.typ(self.obj(a).typ).form == Form::NoTyp {
                                self.diag.borrow_mut().mark("mult def");
                            } else {
                                self.diag.borrow_mut().mark("invalid import order");
                            }
                        } else {
                            self.diag.borrow_mut().mark("conflict with alias");
                        }
                        a
                    }
                }
            }
            Some(o) => {
                if decl {
                    if self.typ(self.obj(o).typ).form == Form::NoTyp {
                        self.diag.borrow_mut().mark("mult def");
                    } else {
                        self.diag.borrow_mut().mark("invalid import order");
                    }
                }
                o
            }
        }
    }

    fn tab_slot(&self, k: i32, path: &Path) -> Result<TypId, HostError> {
        self.typ_tab
            .get(k as usize)
            .copied()
            .flatten()
            .ok_or_else(|| HostError::BadSymbolFile(path.to_path_buf()))
    }

    /// Deserialises one type. Positive reference numbers introduce a fresh
    /// slot, negative ones point back at an earlier type.
    fn in_type(
        &mut self,
        r: &mut impl Read,
        this_mod: ObjId,
        path: &Path,
    ) -> Result<TypId, HostError> {
        let ref_no = files::read_sbyte(r)?;
        if ref_no < 0 {
            return self.tab_slot(-ref_no, path);
        }
        let form = Form::from_i32(files::read_sbyte(r)?)
            .ok_or_else(|| HostError::BadSymbolFile(path.to_path_buf()))?;
        let mut t = self.alloc_typ(Type {
            form,
            mno: self.obj(this_mod).lev,
            ..Type::default()
        });
        if (ref_no as usize) < MAX_TYP_TAB {
            self.typ_tab[ref_no as usize] = Some(t);
        }
        match form {
            Form::Pointer => {
                let base = self.in_type(r, this_mod, path)?;
                let tp = self.typ_mut(t);
                tp.base = Some(base);
                tp.size = 4;
            }
            Form::Array => {
                let base = self.in_type(r, this_mod, path)?;
                let len = files::read_num(r)?;
                let size = files::read_num(r)?;
                let tp = self.typ_mut(t);
                tp.base = Some(base);
                tp.len = len;
                tp.size = size;
            }
            Form::Record => {
                let base = self.in_type(r, this_mod, path)?;
                let bot;
                if self.typ(base).form == Form::NoTyp {
                    bot = None;
                } else {
                    bot = self.typ(base).dsc;
                    self.typ_mut(t).base = Some(base);
                }
                self.typ_mut(t).len = files::read_num(r)?; // exno of the type object
                self.typ_mut(t).nof_par = files::read_num(r)?; // extension level
                self.typ_mut(t).size = files::read_num(r)?;
                let mut last: Option<ObjId> = None;
                let mut class = files::read_sbyte(r)?;
                while class != 0 {
                    let cls = Class::from_i32(class)
                        .ok_or_else(|| HostError::BadSymbolFile(path.to_path_buf()))?;
                    let name = files::read_string(r)?;
                    let mut fld = Object::new(&name, cls, self.nil_typ);
                    fld.expo = !name.is_empty();
                    let fid = self.alloc_obj(fld);
                    match last {
                        Some(l) => self.obj_mut(l).next = Some(fid),
                        None => self.typ_mut(t).dsc = Some(fid),
                    }
                    last = Some(fid);
                    if !name.is_empty() {
                        let ft = self.in_type(r, this_mod, path)?;
                        self.obj_mut(fid).typ = ft;
                    }
                    self.obj_mut(fid).val = files::read_num(r)?;
                    class = files::read_sbyte(r)?;
                }
                match last {
                    Some(l) => self.obj_mut(l).next = bot,
                    None => self.typ_mut(t).dsc = bot,
                }
            }
            Form::Proc => {
                let base = self.in_type(r, this_mod, path)?;
                self.typ_mut(t).base = Some(base);
                let mut head: Option<ObjId> = None;
                let mut np = 0;
                let mut class = files::read_sbyte(r)?;
                while class != 0 {
                    let cls = Class::from_i32(class)
                        .ok_or_else(|| HostError::BadSymbolFile(path.to_path_buf()))?;
                    let rdo = files::read_sbyte(r)? == 1;
                    let pt = self.in_type(r, this_mod, path)?;
                    let mut par = Object::new("", cls, pt);
                    par.rdo = rdo;
                    par.next = head;
                    head = Some(self.alloc_obj(par));
                    np += 1;
                    class = files::read_sbyte(r)?;
                }
                let tp = self.typ_mut(t);
                tp.dsc = head;
                tp.nof_par = np;
                tp.size = 4;
            }
            _ => {}
        }
        // a nonempty module name marks a re-imported type
        let mod_name = files::read_string(r)?;
        if !mod_name.is_empty() {
            let key = files::read_int(r)?;
            let name = files::read_string(r)?;
            let m = self.this_module(&mod_name, &mod_name, false, key);
            let mut obj = self.obj(m).dsc;
            while let Some(o) = obj {
                if self.obj(o).name == name {
                    break;
                }
                obj = self.obj(o).next;
            }
            match obj {
                Some(o) => t = self.obj(o).typ,
                None => {
                    let mut tobj = Object::new(&name, Class::Typ, t);
                    tobj.next = self.obj(m).dsc;
                    let oid = self.alloc_obj(tobj);
                    self.obj_mut(m).dsc = Some(oid);
                    let lev = self.obj(m).lev;
                    let tp = self.typ_mut(t);
                    tp.mno = lev;
                    tp.typ_obj = Some(oid);
                }
            }
            if (ref_no as usize) < MAX_TYP_TAB {
                self.typ_tab[ref_no as usize] = Some(t);
            }
        }
        Ok(t)
    }

    /// Imports `alias := original`. A missing symbol file is a compile
    /// error, not a host error; anything that goes wrong while reading an
    /// existing file is fatal.
    pub fn import(&mut self, alias: &str, org_name: &str) -> Result<(), HostError> {
        if org_name == "SYSTEM" {
            let m = self.this_module(alias, org_name, true, 0);
            self.nof_mod -= 1;
            let sys = self.system;
            let o = self.obj_mut(m);
            o.lev = 0;
            o.dsc = sys;
            o.rdo = true;
            return Ok(());
        }
        let path = self.dir.join(format!("{}.smb", org_name));
        let f = match File::open(&path) {
            Ok(f) => f,
            Err(_) => {
                self.diag.borrow_mut().mark("import not available");
                return Ok(());
            }
        };
        let mut r = BufReader::new(f);
        let _size = files::read_int(&mut r)?;
        let key = files::read_int(&mut r)?;
        let _mod_name = files::read_string(&mut r)?;
        let this_mod = self.this_module(alias, org_name, true, key);
        self.obj_mut(this_mod).rdo = true;
        if files::read_sbyte(&mut r)? != VERSION_KEY as i32 {
            self.diag.borrow_mut().mark("wrong version");
        }
        let mut class = files::read_sbyte(&mut r)?;
        while class != 0 {
            let cls = Class::from_i32(class)
                .ok_or_else(|| HostError::BadSymbolFile(path.clone()))?;
            let name = files::read_string(&mut r)?;
            let t = self.in_type(&mut r, this_mod, &path)?;
            let mut obj = Object::new(&name, cls, t);
            obj.lev = -self.obj(this_mod).lev;
            let id = self.alloc_obj(obj);
            match cls {
                Class::Typ => {
                    self.typ_mut(t).typ_obj = Some(id);
                    // fix up bases of pointer types declared before their record
                    let mut k = files::read_sbyte(&mut r)?;
                    while k != 0 {
                        let slot = self.tab_slot(k, &path)?;
                        self.typ_mut(slot).base = Some(t);
                        k = files::read_sbyte(&mut r)?;
                    }
                }
                Class::Const => {
                    let val = if self.typ(t).form == Form::Real {
                        files::read_int(&mut r)?
                    } else {
                        files::read_num(&mut r)?
                    };
                    self.obj_mut(id).val = val;
                }
                Class::Var => {
                    let val = files::read_num(&mut r)?;
                    let o = self.obj_mut(id);
                    o.val = val;
                    o.rdo = true;
                }
                _ => {}
            }
            let head = self.obj(this_mod).dsc;
            self.obj_mut(id).next = head;
            self.obj_mut(this_mod).dsc = Some(id);
            class = files::read_sbyte(&mut r)?;
        }
        Ok(())
    }

    fn out_par(&mut self, w: &mut Vec<u8>, par: Option<ObjId>, n: i32) -> io::Result<()> {
        if n > 0 {
            let Some(p) = par else { return Ok(()) };
            let next = self.obj(p).next;
            self.out_par(w, next, n - 1)?;
            files::write_byte(w, self.obj(p).class as i32 as u8)?;
            files::write_byte(w, if self.obj(p).rdo { 1 } else { 0 })?;
            let pt = self.obj(p).typ;
            self.out_type(w, pt)?;
        }
        Ok(())
    }

    /// Emits the offsets of pointers buried in unexported fields, so the
    /// garbage collector can trace them through the imported record.
    fn find_hidden_pointers(&mut self, w: &mut Vec<u8>, typ: TypId, offset: i32) -> io::Result<()> {
        match self.typ(typ).form {
            Form::Pointer | Form::NilTyp => {
                files::write_byte(w, Class::Fld as i32 as u8)?;
                files::write_byte(w, 0)?; // anonymous
                files::write_num(w, offset)?;
            }
            Form::Record => {
                let mut fld = self.typ(typ).dsc;
                while let Some(f) = fld {
                    let ft = self.obj(f).typ;
                    let off = self.obj(f).val + offset;
                    self.find_hidden_pointers(w, ft, off)?;
                    fld = self.obj(f).next;
                }
            }
            Form::Array => {
                let base = self.typ(typ).base.unwrap_or(self.no_typ);
                let size = self.typ(base).size;
                let n = self.typ(typ).len;
                for i in 0..n {
                    self.find_hidden_pointers(w, base, size * i + offset)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn out_type(&mut self, w: &mut Vec<u8>, t: TypId) -> io::Result<()> {
        if self.typ(t).sf_ref > 0 {
            // already in the file
            return files::write_byte(w, (-self.typ(t).sf_ref) as u8);
        }
        let obj = self.typ(t).typ_obj;
        if obj.is_some() {
            files::write_byte(w, self.sf_ref as u8)?;
            self.typ_mut(t).sf_ref = self.sf_ref;
            self.sf_ref += 1;
        } else {
            files::write_byte(w, 0)?; // anonymous
        }
        files::write_byte(w, self.typ(t).form as i32 as u8)?;
        match self.typ(t).form {
            Form::Pointer => {
                let base = self.typ(t).base.unwrap_or(self.no_typ);
                self.out_type(w, base)?;
            }
            Form::Array => {
                let base = self.typ(t).base.unwrap_or(self.no_typ);
                self.out_type(w, base)?;
                files::write_num(w, self.typ(t).len)?;
                files::write_num(w, self.typ(t).size)?;
            }
            Form::Record => {
                let bot = match self.typ(t).base {
                    Some(b) => {
                        self.out_type(w, b)?;
                        self.typ(b).dsc
                    }
                    None => {
                        let no = self.no_typ;
                        self.out_type(w, no)?;
                        None
                    }
                };
                match obj {
                    Some(o) => files::write_num(w, self.obj(o).exno as i32)?,
                    None => files::write_byte(w, 0)?,
                }
                files::write_num(w, self.typ(t).nof_par)?; // extension level
                files::write_num(w, self.typ(t).size)?;
                let mut fld = self.typ(t).dsc;
                while fld != bot {
                    let Some(f) = fld else { break };
                    if self.obj(f).expo {
                        files::write_byte(w, Class::Fld as i32 as u8)?;
                        let name = self.obj(f).name.clone();
                        files::write_string(w, &name)?;
                        let ft = self.obj(f).typ;
                        self.out_type(w, ft)?;
                        files::write_num(w, self.obj(f).val)?; // offset
                    } else {
                        let ft = self.obj(f).typ;
                        let off = self.obj(f).val;
                        self.find_hidden_pointers(w, ft, off)?;
                    }
                    fld = self.obj(f).next;
                }
                files::write_byte(w, 0)?;
            }
            Form::Proc => {
                let base = self.typ(t).base.unwrap_or(self.no_typ);
                self.out_type(w, base)?;
                let dsc = self.typ(t).dsc;
                let n = self.typ(t).nof_par;
                self.out_par(w, dsc, n)?;
                files::write_byte(w, 0)?;
            }
            _ => {}
        }
        let mno = self.typ(t).mno;
        if mno > 0 && obj.is_some() {
            // re-export: name the defining module
            let mut m = self.obj(self.top_scope).next;
            while let Some(o) = m {
                if self.obj(o).lev == mno {
                    break;
                }
                m = self.obj(o).next;
            }
            match m {
                Some(o) => {
                    let org = self.obj(o).org_name.clone();
                    files::write_string(w, &org)?;
                    files::write_int(w, self.obj(o).val)?;
                    let name = obj.map(|x| self.obj(x).name.clone()).unwrap_or_default();
                    files::write_string(w, &name)?;
                }
                None => {
                    self.diag.borrow_mut().mark("re-export not found");
                    files::write_byte(w, 0)?;
                }
            }
        } else {
            files::write_byte(w, 0)?;
        }
        Ok(())
    }

    /// Serialises the exported interface of the module and writes
    /// `<module>.smb`, subject to the key rule: an unchanged key never
    /// rewrites the file; a changed key writes it only when `new_sf` is set
    /// or no previous file exists, and is otherwise reported as "new symbol
    /// file inhibited". Returns the key and whether the file was written.
    pub fn export(&mut self, mod_id: &str, new_sf: bool) -> Result<(i32, bool), HostError> {
        self.sf_ref = Form::Record as i32 + 1;
        let mut w: Vec<u8> = Vec::new();
        files::write_int(&mut w, 0)?; // size placeholder
        files::write_int(&mut w, 0)?; // key, patched below
        files::write_string(&mut w, mod_id)?;
        files::write_byte(&mut w, VERSION_KEY)?;
        let mut obj = self.obj(self.top_scope).next;
        while let Some(o) = obj {
            if self.obj(o).expo {
                files::write_byte(&mut w, self.obj(o).class as i32 as u8)?;
                let name = self.obj(o).name.clone();
                files::write_string(&mut w, &name)?;
                let t = self.obj(o).typ;
                self.out_type(&mut w, t)?;
                match self.obj(o).class {
                    Class::Typ => {
                        if self.typ(t).form == Form::Record {
                            // pointer types declared before this record refer
                            // to it by reference number
                            let mut o0 = self.obj(self.top_scope).next;
                            while o0 != Some(o) {
                                let Some(p) = o0 else { break };
                                let pt = self.obj(p).typ;
                                if self.typ(pt).form == Form::Pointer
                                    && self.typ(pt).base == Some(t)
                                    && self.typ(pt).sf_ref > 0
                                {
                                    files::write_byte(&mut w, self.typ(pt).sf_ref as u8)?;
                                }
                                o0 = self.obj(p).next;
                            }
                        }
                        files::write_byte(&mut w, 0)?;
                    }
                    Class::Const => match self.typ(t).form {
                        Form::Proc => files::write_num(&mut w, self.obj(o).exno as i32)?,
                        Form::Real => files::write_int(&mut w, self.obj(o).val)?,
                        _ => files::write_num(&mut w, self.obj(o).val)?,
                    },
                    Class::Var => files::write_num(&mut w, self.obj(o).exno as i32)?,
                    _ => {}
                }
            }
            obj = self.obj(o).next;
        }
        let pad = 4 - w.len() % 4;
        for _ in 0..pad {
            files::write_byte(&mut w, 0)?;
        }
        for slot in self.typ_tab[(Form::Record as i32 + 1) as usize..].iter_mut() {
            *slot = None;
        }
        let mut sum: i32 = 0;
        for chunk in w.chunks_exact(4) {
            sum = sum.wrapping_add(i32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
        }
        w[4..8].copy_from_slice(&sum.to_le_bytes());

        let path = self.dir.join(format!("{}.smb", mod_id));
        let (old_key, exists) = match read_key(&path) {
            Ok(k) => (k, true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => (sum.wrapping_add(1), false),
            Err(e) => return Err(e.into()),
        };
        if sum != old_key {
            if new_sf || !exists {
                std::fs::write(&path, &w)?;
                return Ok((sum, true));
            }
            self.diag.borrow_mut().mark("new symbol file inhibited");
        }
        Ok((sum, false))
    }
}

fn read_key(path: &Path) -> io::Result<i32> {
    let mut f = File::open(path)?;
    let _size = files::read_int(&mut f)?;
    files::read_int(&mut f)
}
